//! In-memory catalog store.
//!
//! Holds a snapshot of schemas, tables and views and applies the DDL this
//! crate emits. Used for offline dry runs against an exported snapshot and
//! as the catalog behind the planner and runner tests.

use super::{AdminCredential, CatalogStore, LiveColumn, LiveConstraint, QualifiedName};
use crate::ddl;
use crate::declared::EntityDef;
use crate::error::CatalogError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Serializable catalog contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Existing schemas.
    #[serde(default)]
    pub schemas: BTreeSet<String>,
    /// Existing tables keyed by `schema.table`.
    #[serde(default)]
    pub tables: BTreeMap<String, TableSnapshot>,
    /// Existing views, `schema.view`.
    #[serde(default)]
    pub views: BTreeSet<String>,
}

/// One table inside a [`CatalogSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// The table's own columns.
    #[serde(default)]
    pub columns: Vec<LiveColumn>,
    /// Parent table, `schema.table`.
    #[serde(default)]
    pub parent: Option<String>,
    /// Foreign keys defined on the table.
    #[serde(default)]
    pub foreign_keys: Vec<LiveConstraint>,
}

/// A [`CatalogStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogSnapshot>,
    failing_statements: RwLock<Vec<String>>,
    failing_reads: RwLock<HashSet<String>>,
    executed: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from a snapshot.
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        *catalog.state.write() = normalize_snapshot(snapshot);
        catalog
    }

    /// Parse a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_snapshot(serde_json::from_str(json)?))
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.state.read().clone()
    }

    /// Add a schema.
    pub fn with_schema(self, schema: &str) -> Self {
        self.state.write().schemas.insert(schema.to_lowercase());
        self
    }

    /// Add a table with the given own columns, creating its schema as needed.
    pub fn with_table(self, table: &str, columns: &[(&str, &str)]) -> Self {
        if let Some(name) = QualifiedName::parse(table) {
            let mut state = self.state.write();
            state.schemas.insert(name.schema().to_string());
            state.tables.insert(
                name.to_string(),
                TableSnapshot {
                    columns: columns
                        .iter()
                        .map(|(n, t)| LiveColumn::new(n.to_lowercase(), *t))
                        .collect(),
                    parent: None,
                    foreign_keys: Vec::new(),
                },
            );
        }
        self
    }

    /// Set a table's parent.
    pub fn with_parent(self, table: &str, parent: &str) -> Self {
        if let Some(entry) = self.state.write().tables.get_mut(&table.to_lowercase()) {
            entry.parent = Some(parent.to_lowercase());
        }
        self
    }

    /// Add a foreign key to a table.
    pub fn with_foreign_key(self, table: &str, name: &str, fragment: &str) -> Self {
        if let Some(entry) = self.state.write().tables.get_mut(&table.to_lowercase()) {
            entry.foreign_keys.push(LiveConstraint::new(name, fragment));
        }
        self
    }

    /// Add a view, creating its schema as needed.
    pub fn with_view(self, view: &str) -> Self {
        if let Some(name) = QualifiedName::parse(view) {
            let mut state = self.state.write();
            state.schemas.insert(name.schema().to_string());
            state.views.insert(name.to_string());
        }
        self
    }

    /// Make every statement containing `pattern` (case-insensitive) fail.
    pub fn fail_statements_containing(&self, pattern: &str) {
        self.failing_statements.write().push(pattern.to_lowercase());
    }

    /// Make metadata reads of `table` fail.
    pub fn fail_reads_of(&self, table: &str) {
        self.failing_reads.write().insert(table.to_lowercase());
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failing_statements.write().clear();
        self.failing_reads.write().clear();
    }

    /// Statements applied so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn check_read(&self, object: &str) -> Result<(), CatalogError> {
        if self.failing_reads.read().contains(object) {
            return Err(CatalogError::read(object, "injected read failure"));
        }
        Ok(())
    }

    fn check_statement(&self, statement: &str) -> Result<(), CatalogError> {
        let lowered = statement.to_lowercase();
        if self
            .failing_statements
            .read()
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
        {
            return Err(CatalogError::execution(statement, "injected failure"));
        }
        Ok(())
    }

    fn apply(&self, statement: &str) -> Result<(), CatalogError> {
        let trimmed = statement.trim().trim_end_matches(';').trim();
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_uppercase()).collect();
        let words: Vec<&str> = upper.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["CREATE", "SCHEMA", _, ..] => {
                let schema = tokens[2].to_lowercase();
                let mut state = self.state.write();
                if !state.schemas.insert(schema.clone()) {
                    return Err(CatalogError::execution(
                        statement,
                        format!("schema \"{}\" already exists", schema),
                    ));
                }
                Ok(())
            }
            ["CREATE", "TABLE", _, ..] => self.create_from_statement(statement),
            ["DROP", "TABLE", _, ..] => {
                let name = parse_name(statement, tokens[2])?;
                if self.state.write().tables.remove(&name.to_string()).is_none() {
                    return Err(missing_relation(statement, &name));
                }
                Ok(())
            }
            ["CREATE", "INDEX", ..] | ["CREATE", "UNIQUE", "INDEX", ..] | ["DROP", "INDEX", ..]
            | ["REINDEX", ..] => Ok(()),
            ["ALTER", "TABLE", _, ..] if tokens.len() > 3 => {
                let name = parse_name(statement, tokens[2])?;
                self.alter(statement, &name, &tokens[3..], &words[3..])
            }
            _ => Err(CatalogError::Unsupported(statement.to_string())),
        }
    }

    /// Apply a `CREATE TABLE name (columns) [INHERITS (parent)]` statement.
    fn create_from_statement(&self, statement: &str) -> Result<(), CatalogError> {
        let (name, columns, parent) = parse_create_table(statement)?;
        let mut state = self.state.write();
        if !state.schemas.contains(name.schema()) {
            return Err(CatalogError::execution(
                statement,
                format!("schema \"{}\" does not exist", name.schema()),
            ));
        }
        if state.tables.contains_key(&name.to_string()) {
            return Err(CatalogError::execution(
                statement,
                format!("relation \"{}\" already exists", name),
            ));
        }
        if let Some(parent) = &parent {
            if !state.tables.contains_key(&parent.to_string()) {
                return Err(missing_relation(statement, parent));
            }
        }
        state.tables.insert(
            name.to_string(),
            TableSnapshot {
                columns,
                parent: parent.map(|p| p.to_string()),
                foreign_keys: Vec::new(),
            },
        );
        Ok(())
    }

    fn alter(
        &self,
        statement: &str,
        name: &QualifiedName,
        tokens: &[&str],
        words: &[&str],
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let key = name.to_string();
        if !state.tables.contains_key(&key) {
            return Err(missing_relation(statement, name));
        }

        match words {
            ["ADD", "COLUMN", column, rest @ ..] => {
                let column = column.to_lowercase();
                let type_len = rest
                    .iter()
                    .position(|w| matches!(*w, "NOT" | "NULL" | "DEFAULT"))
                    .unwrap_or(rest.len());
                let column_type = tokens[3..3 + type_len].join(" ");
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                if table.columns.iter().any(|c| c.key() == column) {
                    return Err(CatalogError::execution(
                        statement,
                        format!("column \"{}\" already exists", column),
                    ));
                }
                table.columns.push(LiveColumn::new(column, column_type));
                Ok(())
            }
            ["DROP", "COLUMN", column, ..] => {
                let column = column.to_lowercase();
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                let before = table.columns.len();
                table.columns.retain(|c| c.key() != column);
                if table.columns.len() == before {
                    return Err(missing_column(statement, &column));
                }
                Ok(())
            }
            ["RENAME", "COLUMN", from, "TO", to] => {
                let (from, to) = (from.to_lowercase(), to.to_lowercase());
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                if table.columns.iter().any(|c| c.key() == to) {
                    return Err(CatalogError::execution(
                        statement,
                        format!("column \"{}\" already exists", to),
                    ));
                }
                let column = table
                    .columns
                    .iter_mut()
                    .find(|c| c.key() == from)
                    .ok_or_else(|| missing_column(statement, &from))?;
                column.name = to;
                Ok(())
            }
            ["ALTER", "COLUMN", column, "TYPE", rest @ ..] => {
                let column = column.to_lowercase();
                let type_len = rest.iter().position(|w| *w == "USING").unwrap_or(rest.len());
                let column_type = tokens[4..4 + type_len].join(" ");
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                let live = table
                    .columns
                    .iter_mut()
                    .find(|c| c.key() == column)
                    .ok_or_else(|| missing_column(statement, &column))?;
                live.column_type = column_type;
                Ok(())
            }
            ["NO", "INHERIT", _] => {
                let parent = parse_name(statement, tokens[2])?.to_string();
                // Detached columns stay on the child as its own.
                let inherited = lineage_columns(&state, &parent);
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                if table.parent.as_deref() != Some(parent.as_str()) {
                    return Err(CatalogError::execution(
                        statement,
                        format!("relation \"{}\" is not a parent of \"{}\"", parent, key),
                    ));
                }
                let mut columns: Vec<LiveColumn> = inherited
                    .into_iter()
                    .filter(|column| !table.columns.iter().any(|own| own.key() == column.key()))
                    .collect();
                columns.append(&mut table.columns);
                table.columns = columns;
                table.parent = None;
                Ok(())
            }
            ["INHERIT", _] => {
                let parent = parse_name(statement, tokens[1])?;
                if !state.tables.contains_key(&parent.to_string()) {
                    return Err(missing_relation(statement, &parent));
                }
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                if table.parent.is_some() {
                    return Err(CatalogError::execution(
                        statement,
                        "table already has a parent",
                    ));
                }
                table.parent = Some(parent.to_string());
                Ok(())
            }
            ["ADD", "CONSTRAINT", constraint, ..] => {
                let fragment = tokens[3..].join(" ");
                let candidate = LiveConstraint::new(constraint.to_lowercase(), fragment);
                if let Some(target) = candidate.referenced_table() {
                    if !state.tables.contains_key(&target) {
                        return Err(CatalogError::execution(
                            statement,
                            format!("relation \"{}\" does not exist", target),
                        ));
                    }
                }
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                if table
                    .foreign_keys
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(&candidate.name))
                {
                    return Err(CatalogError::execution(
                        statement,
                        format!("constraint \"{}\" already exists", candidate.name),
                    ));
                }
                table.foreign_keys.push(candidate);
                Ok(())
            }
            ["DROP", "CONSTRAINT", "IF", "EXISTS", constraint] => {
                let table = state.tables.get_mut(&key).ok_or_else(|| missing_relation(statement, name))?;
                table
                    .foreign_keys
                    .retain(|c| !c.name.eq_ignore_ascii_case(constraint));
                Ok(())
            }
            _ => Err(CatalogError::Unsupported(statement.to_string())),
        }
    }
}

/// Columns of `key` and its ancestors, ancestors first, like the catalog reports them.
fn lineage_columns(state: &CatalogSnapshot, key: &str) -> Vec<LiveColumn> {
    let mut lineage = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(key.to_string());
    while let Some(name) = current {
        if !visited.insert(name.clone()) {
            break;
        }
        current = state.tables.get(&name).and_then(|t| t.parent.clone());
        lineage.push(name);
    }

    let mut columns: Vec<LiveColumn> = Vec::new();
    for name in lineage.iter().rev() {
        if let Some(entry) = state.tables.get(name) {
            for column in &entry.columns {
                if !columns.iter().any(|c| c.key() == column.key()) {
                    columns.push(column.clone());
                }
            }
        }
    }
    columns
}

/// Split `CREATE TABLE name (a t NOT NULL DEFAULT d, b t) INHERITS (parent)`.
fn parse_create_table(
    statement: &str,
) -> Result<(QualifiedName, Vec<LiveColumn>, Option<QualifiedName>), CatalogError> {
    let malformed = || CatalogError::execution(statement, "malformed CREATE TABLE");
    let trimmed = statement.trim().trim_end_matches(';').trim();
    let open = trimmed.find('(').ok_or_else(malformed)?;
    let head: Vec<&str> = trimmed[..open].split_whitespace().collect();
    let name = match head.as_slice() {
        [create, table, name] if create.eq_ignore_ascii_case("CREATE") && table.eq_ignore_ascii_case("TABLE") => {
            parse_name(statement, name)?
        }
        _ => return Err(malformed()),
    };

    // Types such as numeric(18,6) nest parentheses and commas.
    let mut depth = 0usize;
    let mut close = None;
    let mut parts = Vec::new();
    let mut start = open + 1;
    for (i, ch) in trimmed.char_indices().skip_while(|(i, _)| *i <= open) {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => {
                parts.push(&trimmed[start..i]);
                close = Some(i);
                break;
            }
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&trimmed[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(malformed)?;

    let mut columns = Vec::new();
    for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let words: Vec<&str> = part.split_whitespace().collect();
        let (column, rest) = words.split_first().ok_or_else(malformed)?;
        let type_len = rest
            .iter()
            .position(|w| matches!(w.to_uppercase().as_str(), "NOT" | "NULL" | "DEFAULT"))
            .unwrap_or(rest.len());
        if type_len == 0 {
            return Err(malformed());
        }
        columns.push(LiveColumn::new(column.to_lowercase(), rest[..type_len].join(" ")));
    }

    let tail = trimmed[close + 1..].trim();
    let parent = if tail.is_empty() {
        None
    } else {
        let inner = tail
            .strip_prefix("INHERITS")
            .or_else(|| tail.strip_prefix("inherits"))
            .map(str::trim)
            .and_then(|t| t.strip_prefix('('))
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(malformed)?;
        Some(parse_name(statement, inner.trim())?)
    };

    Ok((name, columns, parent))
}

fn normalize_snapshot(snapshot: CatalogSnapshot) -> CatalogSnapshot {
    CatalogSnapshot {
        schemas: snapshot.schemas.into_iter().map(|s| s.to_lowercase()).collect(),
        tables: snapshot
            .tables
            .into_iter()
            .map(|(name, mut table)| {
                table.parent = table.parent.map(|p| p.to_lowercase());
                for column in &mut table.columns {
                    column.name = column.name.to_lowercase();
                }
                (name.to_lowercase(), table)
            })
            .collect(),
        views: snapshot.views.into_iter().map(|v| v.to_lowercase()).collect(),
    }
}

fn parse_name(statement: &str, token: &str) -> Result<QualifiedName, CatalogError> {
    QualifiedName::parse(token).ok_or_else(|| {
        CatalogError::execution(statement, format!("expected schema.table, got '{}'", token))
    })
}

fn missing_relation(statement: &str, name: &QualifiedName) -> CatalogError {
    CatalogError::execution(statement, format!("relation \"{}\" does not exist", name))
}

fn missing_column(statement: &str, column: &str) -> CatalogError {
    CatalogError::execution(statement, format!("column \"{}\" does not exist", column))
}

impl CatalogStore for MemoryCatalog {
    fn schema_exists(&self, schema: &str) -> Result<bool, CatalogError> {
        let schema = schema.to_lowercase();
        self.check_read(&schema)?;
        Ok(self.state.read().schemas.contains(&schema))
    }

    fn table_exists(&self, table: &QualifiedName) -> Result<bool, CatalogError> {
        let key = table.to_string();
        self.check_read(&key)?;
        Ok(self.state.read().tables.contains_key(&key))
    }

    fn view_exists(&self, view: &QualifiedName) -> Result<bool, CatalogError> {
        let key = view.to_string();
        self.check_read(&key)?;
        Ok(self.state.read().views.contains(&key))
    }

    fn column_details(&self, table: &QualifiedName) -> Result<Vec<LiveColumn>, CatalogError> {
        let key = table.to_string();
        self.check_read(&key)?;
        Ok(lineage_columns(&self.state.read(), &key))
    }

    fn foreign_key_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError> {
        let key = table.to_string();
        self.check_read(&key)?;
        Ok(self
            .state
            .read()
            .tables
            .get(&key)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    fn dependent_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError> {
        let key = table.to_string();
        self.check_read(&key)?;
        let state = self.state.read();
        Ok(state
            .tables
            .iter()
            .filter(|(name, _)| **name != key)
            .flat_map(|(_, t)| t.foreign_keys.iter())
            .filter(|c| c.referenced_table().as_deref() == Some(key.as_str()))
            .cloned()
            .collect())
    }

    fn parent_table(&self, table: &QualifiedName) -> Result<Option<QualifiedName>, CatalogError> {
        let key = table.to_string();
        self.check_read(&key)?;
        Ok(self
            .state
            .read()
            .tables
            .get(&key)
            .and_then(|t| t.parent.as_deref())
            .and_then(QualifiedName::parse))
    }

    fn create_schema(&self, schema: &str, _credential: &AdminCredential) -> Result<(), CatalogError> {
        let statement = ddl::create_schema_statement(schema);
        self.check_statement(&statement)?;
        self.apply(&statement)?;
        self.executed.lock().push(statement);
        Ok(())
    }

    fn create_table(&self, entity: &EntityDef, _credential: &AdminCredential) -> Result<(), CatalogError> {
        let statements = ddl::create_table_statements(entity);
        for statement in &statements {
            self.check_statement(statement)?;
        }

        let primary = entity.identity.clone();
        let history = primary.history();
        let mut state = self.state.write();

        if !state.schemas.contains(primary.schema()) {
            return Err(CatalogError::execution(
                &statements[0],
                format!("schema \"{}\" does not exist", primary.schema()),
            ));
        }
        for (table, statement) in [&primary, &history].into_iter().zip(&statements) {
            if state.tables.contains_key(&table.name().to_string()) {
                return Err(CatalogError::execution(
                    statement,
                    format!("relation \"{}\" already exists", table.name()),
                ));
            }
            if let Some(parent) = table.parent() {
                if !state.tables.contains_key(&parent.name().to_string()) {
                    return Err(missing_relation(statement, parent.name()));
                }
            }
        }

        for table in [&primary, &history] {
            state.tables.insert(
                table.name().to_string(),
                TableSnapshot {
                    columns: entity
                        .columns
                        .iter()
                        .map(|c| LiveColumn::new(c.key(), c.column_type.trim()))
                        .collect(),
                    parent: table.parent().map(|p| p.name().to_string()),
                    foreign_keys: Vec::new(),
                },
            );
        }
        drop(state);

        self.executed.lock().extend(statements);
        Ok(())
    }

    fn execute_sql(&self, statement: &str, _credential: &AdminCredential) -> Result<(), CatalogError> {
        self.check_statement(statement)?;
        self.apply(statement)?;
        self.executed.lock().push(statement.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSpec, TableIdentity};

    fn credential() -> AdminCredential {
        AdminCredential::new("secret")
    }

    fn name(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    #[test]
    fn test_inherited_columns_reported_first() {
        let catalog = MemoryCatalog::new()
            .with_table("core.document", &[("no", "bigint")])
            .with_table("sales.invoice", &[("amount", "numeric(18,6)")])
            .with_parent("sales.invoice", "core.document");

        let columns = catalog.column_details(&name("sales.invoice")).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["no", "amount"]);
        assert!(catalog.column_details(&name("sales.ghost")).unwrap().is_empty());
    }

    #[test]
    fn test_alter_statements_apply() {
        let catalog = MemoryCatalog::new()
            .with_table("sales.invoice", &[("old_total", "numeric(10,2)"), ("legacy", "boolean")]);
        let cred = credential();

        for statement in [
            "ALTER TABLE sales.invoice DROP COLUMN legacy CASCADE",
            "ALTER TABLE sales.invoice RENAME COLUMN old_total TO total",
            "ALTER TABLE sales.invoice ADD COLUMN currency text NOT NULL DEFAULT ''",
            "ALTER TABLE sales.invoice ALTER COLUMN total TYPE numeric(18,6) USING 0",
        ] {
            catalog.execute_sql(statement, &cred).unwrap();
        }

        let columns = catalog.column_details(&name("sales.invoice")).unwrap();
        assert_eq!(
            columns,
            vec![
                LiveColumn::new("total", "numeric(18,6)"),
                LiveColumn::new("currency", "text"),
            ]
        );
        assert_eq!(catalog.executed().len(), 4);
    }

    #[test]
    fn test_inherit_requires_existing_parent() {
        let catalog = MemoryCatalog::new().with_table("sales.invoice", &[]);
        let cred = credential();

        let err = catalog
            .execute_sql("ALTER TABLE sales.invoice INHERIT sales.document", &cred)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let catalog = catalog.with_table("sales.document", &[]);
        catalog
            .execute_sql("ALTER TABLE sales.invoice INHERIT sales.document", &cred)
            .unwrap();
        assert_eq!(
            catalog.parent_table(&name("sales.invoice")).unwrap(),
            Some(name("sales.document"))
        );
        catalog
            .execute_sql("ALTER TABLE sales.invoice NO INHERIT sales.document", &cred)
            .unwrap();
        assert!(catalog.parent_table(&name("sales.invoice")).unwrap().is_none());
    }

    #[test]
    fn test_no_inherit_keeps_parent_columns() {
        let catalog = MemoryCatalog::new()
            .with_table("core.record", &[("id", "bigint")])
            .with_table("core.document", &[("no", "bigint")])
            .with_parent("core.document", "core.record")
            .with_table("sales.invoice", &[("amount", "numeric(18,6)")])
            .with_parent("sales.invoice", "core.document");

        catalog
            .execute_sql("ALTER TABLE sales.invoice NO INHERIT core.document", &credential())
            .unwrap();

        let snapshot = catalog.snapshot();
        let invoice = &snapshot.tables["sales.invoice"];
        assert!(invoice.parent.is_none());
        let names: Vec<&str> = invoice.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "no", "amount"]);
    }

    #[test]
    fn test_create_table_statement_applies() {
        let catalog = MemoryCatalog::new().with_table("sales.h_document", &[("no", "bigint")]);
        let cred = credential();

        catalog
            .execute_sql(
                "CREATE TABLE sales.h_invoice (Amount numeric(18,6) NOT NULL DEFAULT 0, Note text) \
                 INHERITS (sales.h_document)",
                &cred,
            )
            .unwrap();
        assert_eq!(
            catalog.column_details(&name("sales.h_invoice")).unwrap(),
            vec![
                LiveColumn::new("no", "bigint"),
                LiveColumn::new("amount", "numeric(18,6)"),
                LiveColumn::new("note", "text"),
            ]
        );
        assert_eq!(
            catalog.parent_table(&name("sales.h_invoice")).unwrap(),
            Some(name("sales.h_document"))
        );

        catalog.execute_sql("CREATE TABLE sales.empty ()", &cred).unwrap();
        assert!(catalog.column_details(&name("sales.empty")).unwrap().is_empty());
        assert!(catalog
            .execute_sql("CREATE TABLE sales.empty ()", &cred)
            .is_err());
        assert!(catalog
            .execute_sql("CREATE TABLE sales.orphan (a text) INHERITS (sales.ghost)", &cred)
            .is_err());
    }

    #[test]
    fn test_foreign_key_needs_target() {
        let catalog = MemoryCatalog::new().with_table("sales.line", &[("invoice", "bigint")]);
        let cred = credential();
        let fk = "ALTER TABLE sales.line ADD CONSTRAINT fk_line_invoice FOREIGN KEY (invoice) REFERENCES sales.invoice(id)";

        assert!(catalog.execute_sql(fk, &cred).is_err());

        let catalog = catalog.with_table("sales.invoice", &[("id", "bigint")]);
        catalog.execute_sql(fk, &cred).unwrap();

        let fks = catalog.foreign_key_constraints(&name("sales.line")).unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].name, "fk_line_invoice");

        let dependents = catalog.dependent_constraints(&name("sales.invoice")).unwrap();
        assert_eq!(dependents.len(), 1);

        catalog
            .execute_sql(
                "ALTER TABLE sales.line DROP CONSTRAINT IF EXISTS fk_line_invoice",
                &cred,
            )
            .unwrap();
        assert!(catalog.foreign_key_constraints(&name("sales.line")).unwrap().is_empty());
    }

    #[test]
    fn test_create_table_creates_history_twin() {
        let catalog = MemoryCatalog::new()
            .with_schema("sales")
            .with_table("sales.document", &[])
            .with_table("sales.h_document", &[]);
        let entity = EntityDef::table(
            "sales.invoice",
            TableIdentity::new("sales", "invoice")
                .with_parent(TableIdentity::new("sales", "document")),
        )
        .with_column(ColumnSpec::new("Amount", "numeric(18,6)"));

        catalog.create_table(&entity, &credential()).unwrap();

        assert!(catalog.table_exists(&name("sales.invoice")).unwrap());
        assert!(catalog.table_exists(&name("sales.h_invoice")).unwrap());
        assert_eq!(
            catalog.parent_table(&name("sales.h_invoice")).unwrap(),
            Some(name("sales.h_document"))
        );
    }

    #[test]
    fn test_create_table_requires_schema() {
        let catalog = MemoryCatalog::new();
        let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"));
        assert!(catalog.create_table(&entity, &credential()).is_err());
    }

    #[test]
    fn test_injected_failures() {
        let catalog = MemoryCatalog::new().with_table("sales.invoice", &[("a", "text")]);
        catalog.fail_statements_containing("drop column");
        catalog.fail_reads_of("sales.invoice");

        assert!(catalog
            .execute_sql("ALTER TABLE sales.invoice DROP COLUMN a CASCADE", &credential())
            .is_err());
        assert!(catalog.column_details(&name("sales.invoice")).unwrap_err().is_read());

        catalog.clear_failures();
        assert!(catalog.column_details(&name("sales.invoice")).is_ok());
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "schemas": ["Sales"],
            "tables": {
                "sales.invoice": {
                    "columns": [{"name": "Amount", "type": "numeric(10,2)"}],
                    "parent": "sales.document"
                }
            },
            "views": ["sales.open_invoices"]
        }"#;
        let catalog = MemoryCatalog::from_json(json).unwrap();

        assert!(catalog.schema_exists("sales").unwrap());
        assert!(catalog.view_exists(&name("sales.open_invoices")).unwrap());
        assert_eq!(
            catalog.snapshot().tables["sales.invoice"].columns[0].name,
            "amount"
        );
    }

    #[test]
    fn test_unsupported_statement() {
        let catalog = MemoryCatalog::new();
        assert!(matches!(
            catalog.execute_sql("VACUUM FULL", &credential()),
            Err(CatalogError::Unsupported(_))
        ));
    }
}
