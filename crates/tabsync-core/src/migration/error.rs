//! Migration-specific error types.

use crate::error::{CatalogError, DeclaredSchemaError};
use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Live metadata could not be read; planning for the entity was aborted.
    #[error("catalog read failed for {entity}: {source}")]
    CatalogRead {
        /// The entity being planned.
        entity: String,
        /// The underlying catalog error.
        #[source]
        source: CatalogError,
    },

    /// A statement of an executing plan failed. Earlier statements stay applied.
    #[error("{entity}: statement {step_index} failed: {statement}: {reason}")]
    PlanExecution {
        /// The entity whose plan was executing.
        entity: String,
        /// Position of the failing statement in the plan.
        step_index: usize,
        /// The failing statement text.
        statement: String,
        /// Why it failed.
        reason: String,
    },

    /// Planning was aborted, so the plan cannot be executed.
    #[error("{entity}: plan unresolved: {trace}")]
    Unresolved {
        /// The entity.
        entity: String,
        /// Why planning failed.
        trace: String,
    },

    /// A view-backed entity's view does not exist.
    #[error("{entity}: view {view} does not exist")]
    ViewMissing {
        /// The entity.
        entity: String,
        /// The expected view.
        view: String,
    },

    /// The declared schema for the entity could not be read.
    #[error("declared schema unavailable for {entity}: {source}")]
    DeclaredSchema {
        /// The entity.
        entity: String,
        /// The underlying provider error.
        #[source]
        source: DeclaredSchemaError,
    },

    /// A freshly computed plan differs from the one that was reviewed.
    #[error("plan changed since review: expected {expected}, found {actual}")]
    PlanChanged {
        /// Fingerprint that was reviewed.
        expected: String,
        /// Fingerprint of the fresh plan.
        actual: String,
    },

    /// Deploying made no progress toward an up-to-date entity.
    #[error("{entity}: no progress after executing plan, still {classification}")]
    Stalled {
        /// The entity.
        entity: String,
        /// Classification observed after execution.
        classification: String,
    },

    /// A batch run stopped with entities still failing.
    #[error("convergence exhausted: {errors} error(s), {remaining} entities remaining")]
    ConvergenceExhausted {
        /// Entities still in the working set.
        remaining: usize,
        /// Errors in the final round.
        errors: usize,
    },

    /// Journal storage error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl MigrationError {
    /// Wrap a catalog read failure for an entity.
    pub fn catalog_read(entity: impl Into<String>, source: CatalogError) -> Self {
        MigrationError::CatalogRead {
            entity: entity.into(),
            source,
        }
    }

    /// Wrap a declared-schema failure for an entity.
    pub fn declared(entity: impl Into<String>, source: DeclaredSchemaError) -> Self {
        MigrationError::DeclaredSchema {
            entity: entity.into(),
            source,
        }
    }

    /// Whether re-running the planner may succeed without outside changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrationError::CatalogRead { .. }
                | MigrationError::PlanExecution { .. }
                | MigrationError::Unresolved { .. }
        )
    }
}
