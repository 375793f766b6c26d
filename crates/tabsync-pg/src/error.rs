//! PostgreSQL catalog error types.

use tabsync_core::CatalogError;
use thiserror::Error;

/// PostgreSQL catalog errors.
#[derive(Debug, Error)]
pub enum PgCatalogError {
    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    Config(String),

    /// Connecting to the server failed.
    #[error("connection error: {0}")]
    Connection(#[source] postgres::Error),

    /// A query or statement failed.
    #[error("query error: {0}")]
    Query(#[from] postgres::Error),
}

impl PgCatalogError {
    /// Convert into a catalog read error for `object`.
    pub fn into_read(self, object: impl Into<String>) -> CatalogError {
        CatalogError::read(object, self.to_string())
    }

    /// Convert into a catalog execution error for `statement`.
    pub fn into_execution(self, statement: impl Into<String>) -> CatalogError {
        let reason = match &self {
            PgCatalogError::Query(e) => e
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| e.to_string()),
            other => other.to_string(),
        };
        CatalogError::execution(statement, reason)
    }
}
