//! Declared and live column descriptions.

use serde::{Deserialize, Serialize};

fn default_mutable() -> bool {
    true
}

/// A column as declared for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, matched case-insensitively.
    pub name: String,
    /// Catalog type string, e.g. `numeric(18,6)`.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Presentation order only.
    #[serde(default)]
    pub display_order: i32,
    /// Whether NULL values are allowed.
    #[serde(default)]
    pub nullable_allowed: bool,
    /// Whether the value may be set after creation.
    #[serde(default = "default_mutable")]
    pub mutable: bool,
}

impl ColumnSpec {
    /// Create a non-nullable, mutable column.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            display_order: 0,
            nullable_allowed: false,
            mutable: true,
        }
    }

    /// Allow NULL values.
    pub fn nullable(mut self) -> Self {
        self.nullable_allowed = true;
        self
    }

    /// Mark the column as set-once.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Set the display order.
    pub fn with_display_order(mut self, order: i32) -> Self {
        self.display_order = order;
        self
    }

    /// Identity used for matching against live columns.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    /// Column name as reported.
    pub name: String,
    /// Catalog-reported type.
    #[serde(rename = "type")]
    pub column_type: String,
}

impl LiveColumn {
    /// Create a live column.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }

    /// Identity used for matching against declared columns.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}
