//! Tabsync Core - schema-evolution diffing and migration planning.
//!
//! Compares declared entity tables against a live relational catalog and
//! produces the DDL that brings each primary table, its history twin and
//! their inheritance chains into line with the declaration.

pub mod catalog;
pub mod ddl;
pub mod declared;
pub mod error;
pub mod migration;

pub use catalog::{
    AdminCredential, CatalogSnapshot, CatalogStore, ColumnSpec, LiveColumn, LiveConstraint,
    MemoryCatalog, QualifiedName, TableIdentity,
};
pub use declared::{DeclaredSchemaProvider, EntityDef, EntityKind, ManifestProvider};
pub use error::{CatalogError, DeclaredSchemaError};
pub use migration::{
    AlterOperation, BatchConvergenceRunner, DeploymentJournal, MigrationError, MigrationPlan,
    MigrationPlanner, PlanClassification, PlannerConfig, RunReport, RunnerConfig,
};
