//! History-twin mirroring and inheritance repair.

use super::plan::{AlterOperation, OperationKind};
use crate::catalog::{QualifiedName, TableIdentity};

/// Parents reported by the catalog for a primary table and its history twin.
///
/// The two are read separately and may disagree before convergence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveLineage {
    /// Live parent of the primary table.
    pub primary_parent: Option<QualifiedName>,
    /// Live parent of the history table.
    pub history_parent: Option<QualifiedName>,
}

/// How the history twin's columns are brought in step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRepair {
    /// The twin needs the same column changes as the primary; mirror them.
    Mirror,
    /// The twin diverged from the primary; apply its own column changes.
    Diverged(Vec<AlterOperation>),
    /// The twin does not exist; create it with this statement.
    Missing(AlterOperation),
}

/// Keeps the history twin and both inheritance chains in step with the primary table.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritanceSynchronizer;

impl InheritanceSynchronizer {
    /// Create a synchronizer.
    pub fn new() -> Self {
        Self
    }

    /// Combine the primary's column operations with the history repair, then
    /// append inheritance repairs for the primary and history tables.
    ///
    /// When mirroring, each column operation is followed by its history copy.
    pub fn sync(
        &self,
        table: &TableIdentity,
        column_ops: Vec<AlterOperation>,
        repair: HistoryRepair,
        live: &LiveLineage,
    ) -> Vec<AlterOperation> {
        let history = table.history();
        let mut operations = Vec::with_capacity(column_ops.len() * 2 + 4);
        let mut history_created = false;

        match repair {
            HistoryRepair::Mirror => {
                for op in column_ops {
                    let mirrored = if op.mirror {
                        op.retarget(history.name())
                    } else {
                        None
                    };
                    operations.push(op);
                    operations.extend(mirrored);
                }
            }
            HistoryRepair::Diverged(history_ops) => {
                operations.extend(column_ops.into_iter().map(unmirrored));
                operations.extend(history_ops.into_iter().map(unmirrored));
            }
            HistoryRepair::Missing(create) => {
                operations.push(create);
                operations.extend(column_ops.into_iter().map(unmirrored));
                history_created = true;
            }
        }

        operations.extend(reparent(
            table.name(),
            live.primary_parent.as_ref(),
            table.parent().map(TableIdentity::name),
        ));
        // A freshly created twin already inherits from its declared parent.
        if !history_created {
            operations.extend(reparent(
                history.name(),
                live.history_parent.as_ref(),
                history.parent().map(TableIdentity::name),
            ));
        }

        operations
    }
}

/// Whether `history` holds exactly the clauses of `primary`, in order.
pub fn mirrors(primary: &[AlterOperation], history: &[AlterOperation]) -> bool {
    primary.len() == history.len()
        && primary
            .iter()
            .zip(history)
            .all(|(p, h)| p.kind == h.kind && p.clause() == h.clause())
}

fn unmirrored(mut op: AlterOperation) -> AlterOperation {
    op.mirror = false;
    op
}

/// `NO INHERIT` the live parent and `INHERIT` the declared one when they differ.
fn reparent(
    table: &QualifiedName,
    live: Option<&QualifiedName>,
    declared: Option<&QualifiedName>,
) -> Vec<AlterOperation> {
    if live == declared {
        return Vec::new();
    }

    let mut operations = Vec::with_capacity(2);
    if let Some(old) = live {
        operations.push(AlterOperation::table(
            OperationKind::NoInherit,
            table,
            format!("NO INHERIT {}", old),
        ));
    }
    if let Some(new) = declared {
        operations.push(AlterOperation::table(
            OperationKind::Inherit,
            table,
            format!("INHERIT {}", new),
        ));
    }
    operations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> TableIdentity {
        TableIdentity::new("sales", "invoice")
            .with_parent(TableIdentity::new("sales", "billable_document"))
    }

    fn name(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    fn statements(ops: &[AlterOperation]) -> Vec<String> {
        ops.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_column_operations_are_mirrored_in_place() {
        let table = invoice();
        let ops = vec![
            AlterOperation::column(
                OperationKind::AlterColumnType,
                table.name(),
                "ALTER COLUMN amount TYPE numeric(18,6) USING 0",
            ),
            AlterOperation::column(
                OperationKind::AddColumn,
                table.name(),
                "ADD COLUMN currency text NOT NULL DEFAULT ''",
            ),
        ];
        let live = LiveLineage {
            primary_parent: Some(name("sales.billable_document")),
            history_parent: Some(name("sales.h_billable_document")),
        };

        let result = InheritanceSynchronizer::new().sync(&table, ops, HistoryRepair::Mirror, &live);
        assert_eq!(
            statements(&result),
            vec![
                "ALTER TABLE sales.invoice ALTER COLUMN amount TYPE numeric(18,6) USING 0;",
                "ALTER TABLE sales.h_invoice ALTER COLUMN amount TYPE numeric(18,6) USING 0;",
                "ALTER TABLE sales.invoice ADD COLUMN currency text NOT NULL DEFAULT '';",
                "ALTER TABLE sales.h_invoice ADD COLUMN currency text NOT NULL DEFAULT '';",
            ]
        );
    }

    #[test]
    fn test_wrong_parent_is_replaced_on_both_chains() {
        let live = LiveLineage {
            primary_parent: Some(name("sales.document")),
            history_parent: Some(name("sales.h_document")),
        };

        let result = InheritanceSynchronizer::new().sync(&invoice(), Vec::new(), HistoryRepair::Mirror, &live);
        assert_eq!(
            statements(&result),
            vec![
                "ALTER TABLE sales.invoice NO INHERIT sales.document;",
                "ALTER TABLE sales.invoice INHERIT sales.billable_document;",
                "ALTER TABLE sales.h_invoice NO INHERIT sales.h_document;",
                "ALTER TABLE sales.h_invoice INHERIT sales.h_billable_document;",
            ]
        );
    }

    #[test]
    fn test_chains_are_checked_independently() {
        let live = LiveLineage {
            primary_parent: Some(name("sales.billable_document")),
            history_parent: None,
        };

        let result = InheritanceSynchronizer::new().sync(&invoice(), Vec::new(), HistoryRepair::Mirror, &live);
        assert_eq!(
            statements(&result),
            vec!["ALTER TABLE sales.h_invoice INHERIT sales.h_billable_document;"]
        );
    }

    #[test]
    fn test_undeclared_parent_is_detached() {
        let live = LiveLineage {
            primary_parent: Some(name("sales.document")),
            history_parent: Some(name("sales.h_document")),
        };

        let table = TableIdentity::new("sales", "invoice");
        let result = InheritanceSynchronizer::new().sync(&table, Vec::new(), HistoryRepair::Mirror, &live);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|op| op.kind == OperationKind::NoInherit));
    }

    #[test]
    fn test_diverged_history_gets_its_own_operations() {
        let table = invoice();
        let primary = vec![AlterOperation::column(
            OperationKind::AddColumn,
            table.name(),
            "ADD COLUMN currency text NOT NULL DEFAULT ''",
        )];
        let history_name = table.history().name().clone();
        let history = vec![
            AlterOperation::column(
                OperationKind::DropColumn,
                &history_name,
                "DROP COLUMN legacy CASCADE",
            ),
            AlterOperation::column(
                OperationKind::AddColumn,
                &history_name,
                "ADD COLUMN currency text NOT NULL DEFAULT ''",
            ),
        ];
        assert!(!mirrors(&primary, &history));
        let live = LiveLineage {
            primary_parent: Some(name("sales.billable_document")),
            history_parent: Some(name("sales.h_billable_document")),
        };

        let result =
            InheritanceSynchronizer::new().sync(&table, primary, HistoryRepair::Diverged(history), &live);
        assert_eq!(
            statements(&result),
            vec![
                "ALTER TABLE sales.invoice ADD COLUMN currency text NOT NULL DEFAULT '';",
                "ALTER TABLE sales.h_invoice DROP COLUMN legacy CASCADE;",
                "ALTER TABLE sales.h_invoice ADD COLUMN currency text NOT NULL DEFAULT '';",
            ]
        );
        assert!(result.iter().all(|op| !op.mirror));
    }

    #[test]
    fn test_missing_history_is_created_first() {
        let table = invoice();
        let create = AlterOperation::verbatim(
            OperationKind::CreateHistory,
            table.history().name(),
            "CREATE TABLE sales.h_invoice () INHERITS (sales.h_billable_document)",
        );
        let live = LiveLineage {
            primary_parent: Some(name("sales.billable_document")),
            history_parent: None,
        };

        let result =
            InheritanceSynchronizer::new().sync(&table, Vec::new(), HistoryRepair::Missing(create), &live);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, OperationKind::CreateHistory);
    }

    #[test]
    fn test_mirrors_compares_clauses() {
        let table = invoice();
        let add = |target: &QualifiedName| {
            AlterOperation::column(OperationKind::AddColumn, target, "ADD COLUMN note text")
        };
        assert!(mirrors(&[add(table.name())], &[add(table.history().name())]));
        assert!(mirrors(&[], &[]));
        assert!(!mirrors(&[add(table.name())], &[]));
    }
}
