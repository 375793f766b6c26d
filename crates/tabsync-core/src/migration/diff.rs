//! Column-level diffing of a declared table against its live counterpart.
//!
//! The engine matches columns by lower-cased name. Unmatched live columns
//! become drop-outs and unmatched declared columns become new columns. A new
//! column is paired with a drop-out of the same type and turned into a
//! rename, unless a rename hint names the old column explicitly.

use super::plan::{AlterOperation, OperationKind, RenameWarning};
use crate::catalog::{ColumnSpec, LiveColumn, QualifiedName};
use crate::ddl;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Column operations for one table, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ColumnDiff {
    /// Drops, then renames, then adds, then type changes.
    pub operations: Vec<AlterOperation>,
    /// Renames chosen among several candidates.
    pub rename_warnings: Vec<RenameWarning>,
}

impl ColumnDiff {
    /// Whether no column changes are needed.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether any column is dropped.
    pub fn drops_columns(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind == OperationKind::DropColumn)
    }
}

/// Compares declared columns against live columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnDiffEngine {
    rename_hints: BTreeMap<String, String>,
}

impl ColumnDiffEngine {
    /// Create an engine that detects renames by type only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult explicit `new → old` renames before matching by type.
    pub fn with_rename_hints(mut self, hints: BTreeMap<String, String>) -> Self {
        self.rename_hints = hints
            .into_iter()
            .map(|(new, old)| (new.to_lowercase(), old.to_lowercase()))
            .collect();
        self
    }

    /// Compute the column operations that turn `live` into `declared`.
    ///
    /// `live` must contain only the table's own columns.
    pub fn diff(
        &self,
        table: &QualifiedName,
        declared: &[ColumnSpec],
        live: &[LiveColumn],
    ) -> ColumnDiff {
        let mut type_changes = Vec::new();
        let mut new_columns = Vec::new();

        for column in declared {
            let key = column.key();
            match live.iter().find(|l| l.key() == key) {
                Some(existing) => {
                    if !ddl::same_type(&existing.column_type, &column.column_type) {
                        type_changes.push(type_change(table, &existing.name, column));
                    }
                }
                None => new_columns.push(column),
            }
        }

        let mut drop_outs: Vec<&LiveColumn> = live
            .iter()
            .filter(|l| {
                let key = l.key();
                !declared.iter().any(|c| c.key() == key)
            })
            .collect();

        let mut renames = Vec::new();
        let mut adds = Vec::new();
        let mut rename_warnings = Vec::new();

        for column in new_columns {
            let hinted = self
                .rename_hints
                .get(&column.key())
                .and_then(|old| drop_outs.iter().position(|l| l.key() == *old));

            let matched = match hinted {
                Some(index) => Some(index),
                None => {
                    let candidates: Vec<usize> = drop_outs
                        .iter()
                        .enumerate()
                        .filter(|(_, l)| ddl::same_type(&l.column_type, &column.column_type))
                        .map(|(i, _)| i)
                        .collect();
                    if candidates.len() > 1 {
                        let warning = RenameWarning {
                            column: column.name.clone(),
                            chosen: drop_outs[candidates[0]].name.clone(),
                            candidates: candidates
                                .iter()
                                .map(|&i| drop_outs[i].name.clone())
                                .collect(),
                        };
                        warn!(table = %table, %warning, "ambiguous rename");
                        rename_warnings.push(warning);
                    }
                    candidates.first().copied()
                }
            };

            match matched {
                Some(index) => {
                    let old = drop_outs.remove(index);
                    renames.push(AlterOperation::column(
                        OperationKind::RenameColumn,
                        table,
                        format!("RENAME COLUMN {} TO {}", old.name, column.name),
                    ));
                    if !ddl::same_type(&old.column_type, &column.column_type) {
                        type_changes.push(type_change(table, &column.name, column));
                    }
                }
                None => adds.push(AlterOperation::column(
                    OperationKind::AddColumn,
                    table,
                    format!("ADD COLUMN {}", add_column_definition(column)),
                )),
            }
        }

        let drops = drop_outs.into_iter().map(|l| {
            AlterOperation::column(
                OperationKind::DropColumn,
                table,
                format!("DROP COLUMN {} CASCADE", l.name),
            )
        });

        let operations: Vec<AlterOperation> = drops
            .chain(renames)
            .chain(adds)
            .chain(type_changes)
            .collect();

        if operations.is_empty() {
            debug!(table = %table, "no column changes");
        } else {
            debug!(table = %table, operations = operations.len(), "column changes found");
        }

        ColumnDiff {
            operations,
            rename_warnings,
        }
    }
}

fn type_change(table: &QualifiedName, live_name: &str, column: &ColumnSpec) -> AlterOperation {
    AlterOperation::column(
        OperationKind::AlterColumnType,
        table,
        format!(
            "ALTER COLUMN {} TYPE {} USING {}",
            live_name,
            column.column_type,
            ddl::default_value_for(&column.column_type)
        ),
    )
}

/// New columns are added `NOT NULL` with a type default.
fn add_column_definition(column: &ColumnSpec) -> String {
    format!(
        "{} {} NOT NULL DEFAULT {}",
        column.name,
        column.column_type,
        ddl::default_value_for(&column.column_type)
    )
}
