//! Core error types.

use thiserror::Error;

/// Errors raised by a [`CatalogStore`](crate::catalog::CatalogStore).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reading live metadata failed.
    #[error("failed to read catalog metadata for {object}: {reason}")]
    Read {
        /// The schema or table being inspected.
        object: String,
        /// Why the read failed.
        reason: String,
    },

    /// A DDL statement was rejected by the catalog.
    #[error("statement failed: {statement}: {reason}")]
    Execution {
        /// The statement text.
        statement: String,
        /// Why it failed.
        reason: String,
    },

    /// The statement is not understood by this store.
    #[error("unsupported statement: {0}")]
    Unsupported(String),
}

impl CatalogError {
    /// Build a read error for the given object.
    pub fn read(object: impl Into<String>, reason: impl Into<String>) -> Self {
        CatalogError::Read {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Build an execution error for the given statement.
    pub fn execution(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        CatalogError::Execution {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error happened while reading metadata.
    pub fn is_read(&self) -> bool {
        matches!(self, CatalogError::Read { .. })
    }
}

/// Errors raised by a [`DeclaredSchemaProvider`](crate::declared::DeclaredSchemaProvider).
#[derive(Debug, Error)]
pub enum DeclaredSchemaError {
    /// No declaration exists for the entity.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The declaration is malformed.
    #[error("invalid declaration for {entity}: {reason}")]
    Invalid {
        /// The offending entity.
        entity: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Parent references loop back onto the entity.
    #[error("inheritance cycle through {0}")]
    ParentCycle(String),

    /// Manifest file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest file could not be parsed.
    #[error("manifest parse error: {0}")]
    Json(#[from] serde_json::Error),
}
