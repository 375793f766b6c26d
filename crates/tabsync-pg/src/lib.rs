//! Tabsync PG - PostgreSQL catalog store.
//!
//! Implements [`CatalogStore`](tabsync_core::CatalogStore) over a live
//! PostgreSQL server using the synchronous `postgres` client.
//!
//! # Quick Start
//!
//! ```ignore
//! use tabsync_core::{AdminCredential, ManifestProvider, MigrationPlanner};
//! use tabsync_pg::{PgCatalog, PgConfig};
//!
//! let catalog = PgCatalog::connect(PgConfig::new("host=localhost user=app dbname=erp"))?;
//! let manifest = ManifestProvider::from_path("entities.json")?;
//! let planner = MigrationPlanner::new(&catalog, &manifest);
//!
//! let plan = planner.plan("sales.invoice")?;
//! println!("{}", plan.script());
//! ```

pub mod catalog;
pub mod config;
pub mod error;
mod queries;

pub use catalog::PgCatalog;
pub use config::PgConfig;
pub use error::PgCatalogError;
