//! Migration planning and execution.
//!
//! This module turns a declared entity and the live catalog into reviewable
//! DDL plans:
//! - Column diffing with rename detection
//! - History-twin mirroring and inheritance repair
//! - Foreign key reconciliation
//! - A per-entity state machine with multi-step deploy
//! - Batch convergence across many entities, recorded in a journal
//!
//! # Classifications
//!
//! | Classification | Meaning | Plan |
//! |----------------|---------|------|
//! | `NO_SCHEMA` | Schema missing | `CREATE SCHEMA` |
//! | `NO_TABLE` | Table missing | `CREATE TABLE` for primary and history |
//! | `NEEDS_ALTER` | Table differs | Drops, renames, adds, type changes, inheritance, foreign keys |
//! | `UP_TO_DATE_REINDEXABLE` | Matches, indexes declared | Optional index follow-up |
//! | `UP_TO_DATE` | Matches | Nothing |
//!
//! # Example
//!
//! ```ignore
//! use tabsync_core::migration::{BatchConvergenceRunner, MigrationPlanner, RunnerConfig};
//!
//! let planner = MigrationPlanner::new(&catalog, &manifest);
//!
//! // Review before executing
//! let plan = planner.plan("sales.invoice")?;
//! println!("{}", plan.script());
//!
//! // Deploy everything
//! let runner = BatchConvergenceRunner::new(planner, RunnerConfig::default());
//! let report = runner.run_all(&credential)?.into_result()?;
//! ```

pub mod diff;
pub mod error;
pub mod foreign_key;
pub mod inheritance;
pub mod journal;
pub mod plan;
pub mod planner;
pub mod runner;

// Diff types
pub use diff::{ColumnDiff, ColumnDiffEngine};

// Error types
pub use error::MigrationError;

// Synchronisation types
pub use foreign_key::ForeignKeyReconciler;
pub use inheritance::{HistoryRepair, InheritanceSynchronizer, LiveLineage};

// Plan types
pub use plan::{AlterOperation, MigrationPlan, OperationKind, PlanClassification, RenameWarning};

// Planner types
pub use planner::{DeployOutcome, MigrationPlanner, PlannerConfig};

// Runner types
pub use runner::{
    next_transition, BatchConvergenceRunner, ConvergenceState, EntityResult, RoundStats,
    RunReport, RunnerConfig, StopReason, Transition,
};

// Journal types
pub use journal::{
    current_timestamp, generate_run_id, DeploymentJournal, FailureRecord, RoundRecord, RunRecord,
};
