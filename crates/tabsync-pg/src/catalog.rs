//! PostgreSQL-backed catalog store.

use crate::config::PgConfig;
use crate::error::PgCatalogError;
use crate::queries;
use parking_lot::Mutex;
use postgres::{Client, NoTls};
use tabsync_core::catalog::{
    AdminCredential, CatalogStore, LiveColumn, LiveConstraint, QualifiedName,
};
use tabsync_core::ddl;
use tabsync_core::declared::EntityDef;
use tabsync_core::error::CatalogError;
use tracing::{debug, info};

/// Write connection opened with one admin credential.
struct AdminConnection {
    key: blake3::Hash,
    client: Client,
}

/// A [`CatalogStore`] over a live PostgreSQL server.
///
/// Reads use one connection opened at construction. Writes use a second
/// connection authenticated with the admin credential; it is opened on first
/// use and reopened only when a different credential is presented.
pub struct PgCatalog {
    config: PgConfig,
    reader: Mutex<Client>,
    admin: Mutex<Option<AdminConnection>>,
}

impl PgCatalog {
    /// Connect the read connection.
    pub fn connect(config: PgConfig) -> Result<Self, PgCatalogError> {
        let reader = config
            .reader_config()?
            .connect(NoTls)
            .map_err(PgCatalogError::Connection)?;
        info!("connected to catalog");
        Ok(Self {
            config,
            reader: Mutex::new(reader),
            admin: Mutex::new(None),
        })
    }

    /// The connection configuration.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    fn read<T>(
        &self,
        object: &str,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, CatalogError> {
        let mut client = self.reader.lock();
        f(&mut client).map_err(|e| PgCatalogError::Query(e).into_read(object))
    }

    fn exists(&self, query: &str, table: &QualifiedName, kinds: &[&str]) -> Result<bool, CatalogError> {
        self.read(&table.to_string(), |client| {
            let row = client.query_one(query, &[&table.schema(), &table.table(), &kinds])?;
            Ok(row.get(0))
        })
    }

    fn constraints(&self, query: &str, table: &QualifiedName) -> Result<Vec<LiveConstraint>, CatalogError> {
        self.read(&table.to_string(), |client| {
            let rows = client.query(query, &[&table.schema(), &table.table()])?;
            Ok(rows
                .iter()
                .map(|row| LiveConstraint::new(row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect())
        })
    }

    /// Run `f` on the admin connection, reconnecting if the credential changed.
    fn with_admin(
        &self,
        statement: &str,
        credential: &AdminCredential,
        f: impl FnOnce(&mut Client) -> Result<(), postgres::Error>,
    ) -> Result<(), CatalogError> {
        let key = credential_key(credential);
        let mut slot = self.admin.lock();

        if slot.as_ref().map(|c| c.key) != Some(key) {
            let client = self
                .config
                .admin_config(credential)
                .and_then(|config| config.connect(NoTls).map_err(PgCatalogError::Connection))
                .map_err(|e| e.into_execution(statement))?;
            debug!("opened admin connection");
            *slot = Some(AdminConnection { key, client });
        }

        let connection = slot
            .as_mut()
            .ok_or_else(|| CatalogError::execution(statement, "admin connection unavailable"))?;
        f(&mut connection.client).map_err(|e| PgCatalogError::Query(e).into_execution(statement))
    }
}

/// Identifies the credential an admin connection was opened with.
fn credential_key(credential: &AdminCredential) -> blake3::Hash {
    blake3::hash(credential.expose().as_bytes())
}

impl CatalogStore for PgCatalog {
    fn schema_exists(&self, schema: &str) -> Result<bool, CatalogError> {
        let schema = schema.to_lowercase();
        self.read(&schema, |client| {
            let row = client.query_one(queries::SCHEMA_EXISTS, &[&schema])?;
            Ok(row.get(0))
        })
    }

    fn table_exists(&self, table: &QualifiedName) -> Result<bool, CatalogError> {
        self.exists(queries::RELATION_EXISTS, table, queries::TABLE_KINDS)
    }

    fn view_exists(&self, view: &QualifiedName) -> Result<bool, CatalogError> {
        self.exists(queries::RELATION_EXISTS, view, queries::VIEW_KINDS)
    }

    fn column_details(&self, table: &QualifiedName) -> Result<Vec<LiveColumn>, CatalogError> {
        self.read(&table.to_string(), |client| {
            let rows = client.query(queries::COLUMN_DETAILS, &[&table.schema(), &table.table()])?;
            Ok(rows
                .iter()
                .map(|row| LiveColumn::new(row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect())
        })
    }

    fn foreign_key_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError> {
        self.constraints(queries::FOREIGN_KEYS, table)
    }

    fn dependent_constraints(
        &self,
        table: &QualifiedName,
    ) -> Result<Vec<LiveConstraint>, CatalogError> {
        self.constraints(queries::DEPENDENT_CONSTRAINTS, table)
    }

    fn parent_table(&self, table: &QualifiedName) -> Result<Option<QualifiedName>, CatalogError> {
        self.read(&table.to_string(), |client| {
            let row = client.query_opt(queries::PARENT_TABLE, &[&table.schema(), &table.table()])?;
            Ok(row.map(|row| {
                QualifiedName::new(row.get::<_, String>(0), row.get::<_, String>(1))
            }))
        })
    }

    fn create_schema(&self, schema: &str, credential: &AdminCredential) -> Result<(), CatalogError> {
        let statement = ddl::create_schema_statement(schema);
        self.with_admin(&statement, credential, |client| client.batch_execute(&statement))
    }

    fn create_table(&self, entity: &EntityDef, credential: &AdminCredential) -> Result<(), CatalogError> {
        let statements = ddl::create_table_statements(entity);
        let script = statements.join(";\n");
        self.with_admin(&script, credential, |client| {
            let mut tx = client.transaction()?;
            for statement in &statements {
                tx.batch_execute(statement)?;
            }
            tx.commit()
        })
    }

    fn execute_sql(&self, statement: &str, credential: &AdminCredential) -> Result<(), CatalogError> {
        self.with_admin(statement, credential, |client| client.batch_execute(statement))
    }
}
