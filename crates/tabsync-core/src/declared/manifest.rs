//! JSON manifest of entity declarations.

use super::{DeclaredSchemaProvider, EntityDef, EntityKind};
use crate::catalog::{ColumnSpec, QualifiedName, TableIdentity};
use crate::error::DeclaredSchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// One entity as written in a manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntity {
    /// Entity identifier.
    pub id: String,
    /// Target schema.
    pub schema: String,
    /// Target table.
    pub table: String,
    /// Identifier of the parent entity.
    #[serde(default)]
    pub parent: Option<String>,
    /// Table or view.
    #[serde(default)]
    pub kind: EntityKind,
    /// Own columns.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Foreign key statements.
    #[serde(default)]
    pub foreign_keys: Vec<String>,
    /// Index statements.
    #[serde(default)]
    pub indexes: Vec<String>,
    /// New column name to old column name.
    #[serde(default)]
    pub rename_hints: BTreeMap<String, String>,
}

/// Top-level manifest document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaManifest {
    /// Declared entities.
    pub entities: Vec<ManifestEntity>,
}

/// A [`DeclaredSchemaProvider`] over a fixed set of entity definitions.
#[derive(Debug, Clone, Default)]
pub struct ManifestProvider {
    order: Vec<String>,
    entities: HashMap<String, EntityDef>,
}

impl ManifestProvider {
    /// Build a provider from already-resolved definitions.
    pub fn from_entities(entities: impl IntoIterator<Item = EntityDef>) -> Self {
        let mut provider = Self::default();
        for entity in entities {
            if !provider.entities.contains_key(&entity.id) {
                provider.order.push(entity.id.clone());
            }
            provider.entities.insert(entity.id.clone(), entity);
        }
        provider
    }

    /// Read a manifest from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DeclaredSchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self, DeclaredSchemaError> {
        let manifest: SchemaManifest = serde_json::from_str(json)?;
        Self::from_manifest(manifest)
    }

    /// Resolve parent references and build the provider.
    pub fn from_manifest(manifest: SchemaManifest) -> Result<Self, DeclaredSchemaError> {
        let by_id: HashMap<&str, &ManifestEntity> = manifest
            .entities
            .iter()
            .map(|e| (e.id.as_str(), e))
            .collect();

        let mut resolved = Vec::with_capacity(manifest.entities.len());
        for entity in &manifest.entities {
            let identity = resolve_identity(entity, &by_id)?;
            resolved.push(EntityDef {
                id: entity.id.clone(),
                identity,
                kind: entity.kind,
                columns: entity.columns.clone(),
                foreign_keys: entity.foreign_keys.clone(),
                indexes: entity.indexes.clone(),
                rename_hints: entity
                    .rename_hints
                    .iter()
                    .map(|(new, old)| (new.to_lowercase(), old.to_lowercase()))
                    .collect(),
            });
        }

        Ok(Self::from_entities(resolved))
    }

    /// Number of declared entities.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no entities are declared.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn get(&self, entity: &str) -> Result<&EntityDef, DeclaredSchemaError> {
        self.entities
            .get(entity)
            .ok_or_else(|| DeclaredSchemaError::UnknownEntity(entity.to_string()))
    }
}

/// Walk `parent` references iteratively and build the identity chain.
fn resolve_identity(
    entity: &ManifestEntity,
    by_id: &HashMap<&str, &ManifestEntity>,
) -> Result<TableIdentity, DeclaredSchemaError> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(entity);

    while let Some(e) = current {
        if !visited.insert(e.id.as_str()) {
            return Err(DeclaredSchemaError::ParentCycle(entity.id.clone()));
        }
        if e.schema.trim().is_empty() || e.table.trim().is_empty() {
            return Err(DeclaredSchemaError::Invalid {
                entity: e.id.clone(),
                reason: "schema and table must be set".to_string(),
            });
        }
        chain.push(QualifiedName::new(&e.schema, &e.table));
        current = match &e.parent {
            Some(parent_id) => Some(by_id.get(parent_id.as_str()).copied().ok_or_else(|| {
                DeclaredSchemaError::Invalid {
                    entity: e.id.clone(),
                    reason: format!("unknown parent entity '{}'", parent_id),
                }
            })?),
            None => None,
        };
    }

    TableIdentity::from_chain(chain).ok_or_else(|| DeclaredSchemaError::Invalid {
        entity: entity.id.clone(),
        reason: "empty table chain".to_string(),
    })
}

impl DeclaredSchemaProvider for ManifestProvider {
    fn entities(&self) -> Result<Vec<String>, DeclaredSchemaError> {
        Ok(self.order.clone())
    }

    fn table(&self, entity: &str) -> Result<TableIdentity, DeclaredSchemaError> {
        Ok(self.get(entity)?.identity.clone())
    }

    fn columns(&self, entity: &str) -> Result<Vec<ColumnSpec>, DeclaredSchemaError> {
        Ok(self.get(entity)?.columns.clone())
    }

    fn foreign_key_ddl(&self, entity: &str) -> Result<Vec<String>, DeclaredSchemaError> {
        Ok(self.get(entity)?.foreign_keys.clone())
    }

    fn index_ddl(&self, entity: &str) -> Result<Vec<String>, DeclaredSchemaError> {
        Ok(self.get(entity)?.indexes.clone())
    }

    fn kind(&self, entity: &str) -> Result<EntityKind, DeclaredSchemaError> {
        Ok(self.get(entity)?.kind)
    }

    fn rename_hints(&self, entity: &str) -> Result<BTreeMap<String, String>, DeclaredSchemaError> {
        Ok(self.get(entity)?.rename_hints.clone())
    }

    fn entity(&self, entity: &str) -> Result<EntityDef, DeclaredSchemaError> {
        self.get(entity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "entities": [
            {
                "id": "core.document",
                "schema": "core",
                "table": "document",
                "columns": [{"name": "No", "type": "bigint"}]
            },
            {
                "id": "sales.invoice",
                "schema": "Sales",
                "table": "Invoice",
                "parent": "core.document",
                "columns": [
                    {"name": "Amount", "type": "numeric(18,6)", "display_order": 1},
                    {"name": "Note", "type": "text", "nullable_allowed": true}
                ],
                "foreign_keys": [
                    "ALTER TABLE sales.invoice ADD CONSTRAINT fk_invoice_party FOREIGN KEY (party) REFERENCES core.party(id)"
                ],
                "indexes": ["CREATE INDEX invoice_amount ON sales.invoice(amount)"],
                "rename_hints": {"Amount": "Total"}
            },
            {
                "id": "sales.open_invoices",
                "schema": "sales",
                "table": "open_invoices",
                "kind": "view"
            }
        ]
    }"#;

    #[test]
    fn test_manifest_resolves_parents() {
        let provider = ManifestProvider::from_json(MANIFEST).unwrap();
        assert_eq!(provider.len(), 3);

        let invoice = provider.entity("sales.invoice").unwrap();
        assert_eq!(invoice.identity.name().to_string(), "sales.invoice");
        assert_eq!(
            provider
                .parent("sales.invoice")
                .unwrap()
                .map(|p| p.name().to_string()),
            Some("core.document".to_string())
        );
        assert_eq!(invoice.columns.len(), 2);
        assert_eq!(invoice.rename_hints.get("amount").map(String::as_str), Some("total"));
        assert_eq!(provider.kind("sales.open_invoices").unwrap(), EntityKind::View);
    }

    #[test]
    fn test_manifest_preserves_order() {
        let provider = ManifestProvider::from_json(MANIFEST).unwrap();
        assert_eq!(
            provider.entities().unwrap(),
            vec!["core.document", "sales.invoice", "sales.open_invoices"]
        );
    }

    #[test]
    fn test_unknown_entity() {
        let provider = ManifestProvider::from_json(MANIFEST).unwrap();
        assert!(matches!(
            provider.columns("nope"),
            Err(DeclaredSchemaError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_parent_cycle_detected() {
        let json = r#"{"entities": [
            {"id": "a", "schema": "s", "table": "a", "parent": "b"},
            {"id": "b", "schema": "s", "table": "b", "parent": "a"}
        ]}"#;
        assert!(matches!(
            ManifestProvider::from_json(json),
            Err(DeclaredSchemaError::ParentCycle(_))
        ));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let json = r#"{"entities": [{"id": "a", "schema": "s", "table": "a", "parent": "ghost"}]}"#;
        assert!(matches!(
            ManifestProvider::from_json(json),
            Err(DeclaredSchemaError::Invalid { .. })
        ));
    }
}
