//! Table naming and single-parent inheritance lineage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that turns a primary table name into its history twin.
pub const HISTORY_PREFIX: &str = "H_";

/// A schema-qualified table name.
///
/// Identifiers are folded to lower case on construction, matching how the
/// catalog stores unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    schema: String,
    table: String,
}

impl QualifiedName {
    /// Create a qualified name from its parts.
    pub fn new(schema: impl AsRef<str>, table: impl AsRef<str>) -> Self {
        Self {
            schema: schema.as_ref().trim().to_lowercase(),
            table: table.as_ref().trim().to_lowercase(),
        }
    }

    /// Parse `schema.table`.
    pub fn parse(name: &str) -> Option<Self> {
        let (schema, table) = name.trim().split_once('.')?;
        if schema.is_empty() || table.is_empty() || table.contains('.') {
            return None;
        }
        Some(Self::new(schema, table))
    }

    /// Schema part.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table part.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the history twin.
    pub fn history(&self) -> Self {
        Self::new(&self.schema, format!("{}{}", HISTORY_PREFIX, self.table))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("expected schema.table, got '{}'", value))
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.to_string()
    }
}

/// A table together with its declared inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableIdentity {
    name: QualifiedName,
    parent: Option<Box<TableIdentity>>,
}

impl TableIdentity {
    /// Create an identity without a parent.
    pub fn new(schema: impl AsRef<str>, table: impl AsRef<str>) -> Self {
        Self::from_name(QualifiedName::new(schema, table))
    }

    /// Create an identity from a qualified name.
    pub fn from_name(name: QualifiedName) -> Self {
        Self { name, parent: None }
    }

    /// Attach a parent table.
    pub fn with_parent(mut self, parent: TableIdentity) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Build an identity from a chain of names, child first, root last.
    pub fn from_chain(chain: impl IntoIterator<Item = QualifiedName>) -> Option<Self> {
        let names: Vec<QualifiedName> = chain.into_iter().collect();
        let mut iter = names.into_iter().rev();
        let root = Self::from_name(iter.next()?);
        Some(iter.fold(root, |parent, name| Self::from_name(name).with_parent(parent)))
    }

    /// The table's qualified name.
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// The table's schema.
    pub fn schema(&self) -> &str {
        self.name.schema()
    }

    /// The declared parent, if any.
    pub fn parent(&self) -> Option<&TableIdentity> {
        self.parent.as_deref()
    }

    /// Walk the ancestors, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.parent.as_deref(),
        }
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// The history twin: every table in the chain swapped for its history table.
    pub fn history(&self) -> Self {
        let mut ancestors: Vec<QualifiedName> =
            self.ancestors().map(|t| t.name.history()).collect();
        let mut parent = None;
        while let Some(name) = ancestors.pop() {
            parent = Some(Box::new(Self { name, parent }));
        }
        Self {
            name: self.name.history(),
            parent,
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Iterator over a table's ancestors.
pub struct Ancestors<'a> {
    next: Option<&'a TableIdentity>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TableIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}
