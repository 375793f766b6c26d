//! The catalog access seam.

use super::{LiveColumn, LiveConstraint, QualifiedName};
use crate::declared::EntityDef;
use crate::error::CatalogError;
use std::fmt;

/// Administrator credential for schema-changing calls.
///
/// Acquired once by the caller and passed by reference into every write.
/// It is neither `Clone` nor printable.
pub struct AdminCredential {
    secret: String,
}

impl AdminCredential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// The raw secret, for stores that need to authenticate with it.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminCredential(***)")
    }
}

/// Read and write access to live relational metadata.
///
/// Reads reflect the catalog at call time; nothing here is cached by callers
/// beyond one planning pass.
pub trait CatalogStore {
    /// Whether the schema exists.
    fn schema_exists(&self, schema: &str) -> Result<bool, CatalogError>;

    /// Whether the table exists.
    fn table_exists(&self, table: &QualifiedName) -> Result<bool, CatalogError>;

    /// Whether a view of that name exists.
    fn view_exists(&self, view: &QualifiedName) -> Result<bool, CatalogError>;

    /// All columns of the table, inherited ones included. Unknown tables yield no columns.
    fn column_details(&self, table: &QualifiedName) -> Result<Vec<LiveColumn>, CatalogError>;

    /// Foreign keys defined on the table.
    fn foreign_key_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError>;

    /// Foreign keys on other tables that reference this one.
    fn dependent_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError>;

    /// The table this one inherits from, if any.
    fn parent_table(&self, table: &QualifiedName) -> Result<Option<QualifiedName>, CatalogError>;

    /// Create a schema.
    fn create_schema(&self, schema: &str, credential: &AdminCredential) -> Result<(), CatalogError>;

    /// Create the primary and history tables for an entity.
    fn create_table(&self, entity: &EntityDef, credential: &AdminCredential)
        -> Result<(), CatalogError>;

    /// Execute one DDL statement.
    fn execute_sql(&self, statement: &str, credential: &AdminCredential) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_is_redacted() {
        let credential = AdminCredential::new("hunter2");
        assert_eq!(format!("{:?}", credential), "AdminCredential(***)");
        assert_eq!(credential.expose(), "hunter2");
        assert!(!credential.is_empty());
    }
}
