//! Migration plan types.

use super::error::MigrationError;
use crate::catalog::QualifiedName;
use crate::ddl;
use serde::Serialize;
use std::fmt;

/// What a single operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create the entity's schema.
    CreateSchema,
    /// Create the primary table and its history twin.
    CreateTable,
    /// Create a missing history twin on its own.
    CreateHistory,
    /// Drop a column.
    DropColumn,
    /// Rename a column.
    RenameColumn,
    /// Add a column.
    AddColumn,
    /// Change a column's type.
    AlterColumnType,
    /// Detach a table from its parent.
    NoInherit,
    /// Attach a table to a parent.
    Inherit,
    /// Add a foreign key.
    AddConstraint,
    /// Drop a foreign key.
    DropConstraint,
    /// Rebuild or create an index.
    Reindex,
    /// Drop a table.
    DropTable,
}

impl OperationKind {
    /// Whether the operation can lose data or references.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            OperationKind::DropColumn
                | OperationKind::AlterColumnType
                | OperationKind::DropConstraint
                | OperationKind::DropTable
        )
    }

    /// Whether the operation changes a single column.
    pub fn is_column_change(&self) -> bool {
        matches!(
            self,
            OperationKind::DropColumn
                | OperationKind::RenameColumn
                | OperationKind::AddColumn
                | OperationKind::AlterColumnType
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::CreateSchema => "create_schema",
            OperationKind::CreateTable => "create_table",
            OperationKind::CreateHistory => "create_history",
            OperationKind::DropColumn => "drop_column",
            OperationKind::RenameColumn => "rename_column",
            OperationKind::AddColumn => "add_column",
            OperationKind::AlterColumnType => "alter_column_type",
            OperationKind::NoInherit => "no_inherit",
            OperationKind::Inherit => "inherit",
            OperationKind::AddConstraint => "add_constraint",
            OperationKind::DropConstraint => "drop_constraint",
            OperationKind::Reindex => "reindex",
            OperationKind::DropTable => "drop_table",
        };
        f.write_str(name)
    }
}

/// One DDL statement of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlterOperation {
    /// What the statement does.
    pub kind: OperationKind,
    /// The table the statement changes.
    pub target: QualifiedName,
    /// Statement text, without a trailing semicolon.
    pub statement: String,
    /// Whether the operation must also be applied to the history twin.
    pub mirror: bool,
    #[serde(skip)]
    clause: Option<String>,
}

impl AlterOperation {
    /// A column operation, `ALTER TABLE <target> <clause>`, mirrored onto the history twin.
    pub fn column(kind: OperationKind, target: &QualifiedName, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        Self {
            kind,
            target: target.clone(),
            statement: ddl::alter_table_statement(target, &clause),
            mirror: true,
            clause: Some(clause),
        }
    }

    /// A table-level `ALTER TABLE <target> <clause>` that is not mirrored.
    pub fn table(kind: OperationKind, target: &QualifiedName, clause: impl Into<String>) -> Self {
        Self {
            mirror: false,
            ..Self::column(kind, target, clause)
        }
    }

    /// A complete statement taken as-is.
    pub fn verbatim(kind: OperationKind, target: &QualifiedName, statement: impl Into<String>) -> Self {
        let statement = statement.into();
        Self {
            kind,
            target: target.clone(),
            statement: statement.trim().trim_end_matches(';').trim_end().to_string(),
            mirror: false,
            clause: None,
        }
    }

    /// The same clause applied to another table. `None` for verbatim statements.
    pub fn retarget(&self, table: &QualifiedName) -> Option<Self> {
        let clause = self.clause.as_deref()?;
        Some(Self::table(self.kind, table, clause))
    }

    /// The clause following `ALTER TABLE <target>`, if the statement was built from one.
    pub fn clause(&self) -> Option<&str> {
        self.clause.as_deref()
    }
}

impl fmt::Display for AlterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};", self.statement)
    }
}

/// Where an entity stands relative to its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanClassification {
    /// Planning failed; see the plan's error trace.
    Unresolved,
    /// The schema does not exist.
    NoSchema,
    /// The schema exists, the table does not.
    NoTable,
    /// The table exists and needs changes.
    NeedsAlter,
    /// Nothing to change, but index statements are available.
    UpToDateReindexable,
    /// Nothing to change.
    UpToDate,
}

impl PlanClassification {
    /// Whether no mandatory operations remain.
    pub fn is_up_to_date(&self) -> bool {
        matches!(
            self,
            PlanClassification::UpToDate | PlanClassification::UpToDateReindexable
        )
    }
}

impl fmt::Display for PlanClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanClassification::Unresolved => "UNRESOLVED",
            PlanClassification::NoSchema => "NO_SCHEMA",
            PlanClassification::NoTable => "NO_TABLE",
            PlanClassification::NeedsAlter => "NEEDS_ALTER",
            PlanClassification::UpToDateReindexable => "UP_TO_DATE_REINDEXABLE",
            PlanClassification::UpToDate => "UP_TO_DATE",
        };
        f.write_str(name)
    }
}

/// A rename chosen among several same-typed candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameWarning {
    /// The declared column being introduced.
    pub column: String,
    /// The live column picked as its old name.
    pub chosen: String,
    /// Every live column that had the same type.
    pub candidates: Vec<String>,
}

impl fmt::Display for RenameWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ambiguous rename for {}: chose {} among [{}]",
            self.column,
            self.chosen,
            self.candidates.join(", ")
        )
    }
}

/// An ordered, reviewable list of DDL statements for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    /// The entity identifier.
    pub entity: String,
    /// The entity's primary table.
    pub table: QualifiedName,
    /// Where the entity stands.
    pub classification: PlanClassification,
    /// Mandatory operations, in execution order.
    pub operations: Vec<AlterOperation>,
    /// Optional operations offered after the mandatory ones.
    pub follow_up: Vec<AlterOperation>,
    /// Notes for the reviewer.
    pub warnings: Vec<String>,
    /// Renames picked by first match among several candidates.
    pub rename_warnings: Vec<RenameWarning>,
    /// Why planning failed, for unresolved plans.
    pub error_trace: Option<String>,
}

impl MigrationPlan {
    /// Create an empty plan.
    pub fn new(
        entity: impl Into<String>,
        table: QualifiedName,
        classification: PlanClassification,
    ) -> Self {
        Self {
            entity: entity.into(),
            table,
            classification,
            operations: Vec::new(),
            follow_up: Vec::new(),
            warnings: Vec::new(),
            rename_warnings: Vec::new(),
            error_trace: None,
        }
    }

    /// A plan for an entity whose planning failed.
    pub fn unresolved(entity: impl Into<String>, table: QualifiedName, error: impl fmt::Display) -> Self {
        Self {
            error_trace: Some(error.to_string()),
            ..Self::new(entity, table, PlanClassification::Unresolved)
        }
    }

    /// Set the mandatory operations.
    pub fn with_operations(mut self, operations: Vec<AlterOperation>) -> Self {
        self.operations = operations;
        self
    }

    /// Fail with the recorded trace if planning was aborted.
    pub fn ensure_resolved(&self) -> Result<(), MigrationError> {
        if self.classification != PlanClassification::Unresolved {
            return Ok(());
        }
        Err(MigrationError::Unresolved {
            entity: self.entity.clone(),
            trace: self.error_trace.clone().unwrap_or_default(),
        })
    }

    /// Whether the plan has no mandatory operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether any mandatory operation can lose data.
    pub fn is_destructive(&self) -> bool {
        self.operations.iter().any(|op| op.kind.is_destructive())
    }

    /// Statement texts of the mandatory operations.
    pub fn statements(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.statement.as_str()).collect()
    }

    /// The mandatory operations as a script, one statement per line.
    pub fn script(&self) -> String {
        render_script(&self.operations)
    }

    /// The optional follow-up operations as a script.
    pub fn follow_up_script(&self) -> String {
        render_script(&self.follow_up)
    }

    /// Hash of the entity, classification and script, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.entity.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.classification.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.script().as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

fn render_script(operations: &[AlterOperation]) -> String {
    operations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
