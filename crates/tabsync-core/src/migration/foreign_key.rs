//! Foreign key reconciliation.

use super::plan::{AlterOperation, OperationKind};
use crate::catalog::{LiveConstraint, QualifiedName};

/// Reconciles declared foreign key statements against a table's live constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignKeyReconciler;

impl ForeignKeyReconciler {
    /// Create a reconciler.
    pub fn new() -> Self {
        Self
    }

    /// Emit declared statements with no live counterpart, then drop live
    /// constraints that are no longer declared.
    ///
    /// A live constraint counts as present when a declared statement contains
    /// `ADD CONSTRAINT <name> ` (case and spacing ignored). Each live
    /// constraint satisfies at most one declared statement.
    pub fn reconcile(
        &self,
        table: &QualifiedName,
        declared: &[String],
        live: &[LiveConstraint],
    ) -> Vec<AlterOperation> {
        let mut remaining: Vec<&LiveConstraint> = live.iter().collect();
        let mut operations = Vec::new();

        for statement in declared {
            let normalized = normalize(statement);
            let found = remaining.iter().position(|constraint| {
                normalized.contains(&format!(
                    " add constraint {} ",
                    constraint.name.trim().to_lowercase()
                ))
            });

            match found {
                Some(index) => {
                    remaining.remove(index);
                }
                None => operations.push(AlterOperation::verbatim(
                    OperationKind::AddConstraint,
                    table,
                    statement.as_str(),
                )),
            }
        }

        operations.extend(remaining.into_iter().map(|constraint| {
            AlterOperation::table(
                OperationKind::DropConstraint,
                table,
                format!("DROP CONSTRAINT IF EXISTS {}", constraint.name),
            )
        }));

        operations
    }
}

/// Lower-case, collapse whitespace and pad with spaces so clause matching sees token boundaries.
fn normalize(statement: &str) -> String {
    let collapsed = statement
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!(" {} ", collapsed)
}
