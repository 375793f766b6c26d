//! Live catalog access.
//!
//! This module holds the vocabulary shared by the planner and the stores:
//!
//! - [`QualifiedName`] and [`TableIdentity`] for tables and their lineage
//! - [`ColumnSpec`] and [`LiveColumn`] for declared and reported columns
//! - [`CatalogStore`], the seam every catalog backend implements
//! - [`MemoryCatalog`], an in-memory backend driven by the same DDL

mod column;
mod constraint;
mod identity;
mod memory;
mod store;

pub use column::{ColumnSpec, LiveColumn};
pub use constraint::LiveConstraint;
pub use identity::{Ancestors, QualifiedName, TableIdentity, HISTORY_PREFIX};
pub use memory::{CatalogSnapshot, MemoryCatalog, TableSnapshot};
pub use store::{AdminCredential, CatalogStore};
