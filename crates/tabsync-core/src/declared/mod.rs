//! Declared schema: what each entity's tables should look like.

mod manifest;

pub use manifest::{ManifestEntity, ManifestProvider, SchemaManifest};

use crate::catalog::{ColumnSpec, TableIdentity};
use crate::error::DeclaredSchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an entity is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A primary table with a history twin.
    #[default]
    Table,
    /// A read-only projection; only its existence is checked.
    View,
}

/// Everything declared about one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDef {
    /// Entity identifier.
    pub id: String,
    /// Target table and its declared inheritance chain.
    pub identity: TableIdentity,
    /// Table or view.
    pub kind: EntityKind,
    /// The table's own columns, inherited ones excluded.
    pub columns: Vec<ColumnSpec>,
    /// Complete `ALTER TABLE ... ADD CONSTRAINT ...` statements.
    pub foreign_keys: Vec<String>,
    /// Index (re)build statements offered as optional follow-up.
    pub indexes: Vec<String>,
    /// Explicit renames, new column name to old column name.
    pub rename_hints: BTreeMap<String, String>,
}

impl EntityDef {
    /// Declare a table-backed entity.
    pub fn table(id: impl Into<String>, identity: TableIdentity) -> Self {
        Self {
            id: id.into(),
            identity,
            kind: EntityKind::Table,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            rename_hints: BTreeMap::new(),
        }
    }

    /// Declare a view-backed entity.
    pub fn view(id: impl Into<String>, identity: TableIdentity) -> Self {
        Self {
            kind: EntityKind::View,
            ..Self::table(id, identity)
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a foreign key statement.
    pub fn with_foreign_key(mut self, ddl: impl Into<String>) -> Self {
        self.foreign_keys.push(ddl.into());
        self
    }

    /// Add an index statement.
    pub fn with_index(mut self, ddl: impl Into<String>) -> Self {
        self.indexes.push(ddl.into());
        self
    }

    /// Record that `new_name` used to be called `old_name`.
    pub fn with_rename_hint(mut self, new_name: impl AsRef<str>, old_name: impl AsRef<str>) -> Self {
        self.rename_hints.insert(
            new_name.as_ref().to_lowercase(),
            old_name.as_ref().to_lowercase(),
        );
        self
    }

    /// Whether this entity is a view.
    pub fn is_view(&self) -> bool {
        self.kind == EntityKind::View
    }
}

/// Source of declared entity definitions.
pub trait DeclaredSchemaProvider {
    /// Identifiers of every declared entity, in declaration order.
    fn entities(&self) -> Result<Vec<String>, DeclaredSchemaError>;

    /// Target table of the entity, with its parent chain.
    fn table(&self, entity: &str) -> Result<TableIdentity, DeclaredSchemaError>;

    /// The entity's own columns.
    fn columns(&self, entity: &str) -> Result<Vec<ColumnSpec>, DeclaredSchemaError>;

    /// Foreign key statements for the entity's primary table.
    fn foreign_key_ddl(&self, entity: &str) -> Result<Vec<String>, DeclaredSchemaError>;

    /// Declared parent table.
    fn parent(&self, entity: &str) -> Result<Option<TableIdentity>, DeclaredSchemaError> {
        Ok(self.table(entity)?.parent().cloned())
    }

    /// Index statements.
    fn index_ddl(&self, _entity: &str) -> Result<Vec<String>, DeclaredSchemaError> {
        Ok(Vec::new())
    }

    /// Storage kind.
    fn kind(&self, _entity: &str) -> Result<EntityKind, DeclaredSchemaError> {
        Ok(EntityKind::Table)
    }

    /// Explicit rename hints.
    fn rename_hints(&self, _entity: &str) -> Result<BTreeMap<String, String>, DeclaredSchemaError> {
        Ok(BTreeMap::new())
    }

    /// Assemble the full definition.
    fn entity(&self, entity: &str) -> Result<EntityDef, DeclaredSchemaError> {
        Ok(EntityDef {
            id: entity.to_string(),
            identity: self.table(entity)?,
            kind: self.kind(entity)?,
            columns: self.columns(entity)?,
            foreign_keys: self.foreign_key_ddl(entity)?,
            indexes: self.index_ddl(entity)?,
            rename_hints: self.rename_hints(entity)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
            .with_column(ColumnSpec::new("total", "numeric(10,2)"))
            .with_foreign_key("ALTER TABLE sales.invoice ADD CONSTRAINT fk_x FOREIGN KEY (party) REFERENCES core.party(id)")
            .with_index("CREATE INDEX invoice_total ON sales.invoice(total)")
            .with_rename_hint("Total", "OldTotal");

        assert!(!entity.is_view());
        assert_eq!(entity.columns.len(), 1);
        assert_eq!(entity.rename_hints.get("total").map(String::as_str), Some("oldtotal"));
    }

    #[test]
    fn test_view_entity() {
        let entity = EntityDef::view("sales.open_invoices", TableIdentity::new("sales", "open_invoices"));
        assert!(entity.is_view());
    }
}
