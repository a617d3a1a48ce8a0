//! The store facade.
//!
//! `SqliteStore` is a cheap handle (clone it freely) bundling the native
//! call surface, the type mappings and the scheduler used by async
//! wrappers. Operations start from `put()`, `get()`, `delete()` and
//! `execute_sql()`.
//!
//! ```ignore
//! let store = SqliteStore::builder()
//!     .in_memory()
//!     .add_type_mapping(TypeMapping::<User>::for_entity())
//!     .migrations(vec![Migration::create_table(1, User::table_meta())])
//!     .build()?;
//!
//! store.put().object(user).prepare().execute()?;
//! let users = store
//!     .get()
//!     .list_of_objects::<User>()
//!     .with_query(Query::builder().table("users").build()?)
//!     .prepare()
//!     .execute()?;
//! ```

use std::any::type_name;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use rusqlite::Connection;
use stowage_common::Scheduler;
use tracing::info;

use crate::changes::{Changes, ObservedSet};
use crate::config::StoreConfig;
use crate::low_level::{LowLevel, SqliteLowLevel};
use crate::migrations::{run_migrations, validate, Migration};
use crate::operations::delete::PreparedDelete;
use crate::operations::execute::PreparedExecuteSql;
use crate::operations::get::PreparedGet;
use crate::operations::in_transaction;
use crate::operations::put::PreparedPut;
use crate::type_mapping::{TypeMapping, TypeMappings};
use crate::{StowageError, StowageResult};

struct StoreInner {
    low_level: Arc<dyn LowLevel>,
    type_mappings: TypeMappings,
    scheduler: Scheduler,
}

/// Handle to a SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
}

impl SqliteStore {
    pub fn builder() -> StoreBuilder {
        StoreBuilder
    }

    /// Opens the database described by `config` with no type mappings.
    pub fn from_config(config: &StoreConfig) -> StowageResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn low_level(&self) -> &dyn LowLevel {
        self.inner.low_level.as_ref()
    }

    pub fn type_mappings(&self) -> &TypeMappings {
        &self.inner.type_mappings
    }

    /// Mapping of `T`, exact or inherited from a declared ancestor.
    pub fn type_mapping<T: Send + Sync + 'static>(&self) -> StowageResult<Arc<TypeMapping<T>>> {
        self.inner
            .type_mappings
            .lookup::<T>()
            .ok_or_else(|| StowageError::MappingNotFound(type_name::<T>().to_string()))
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn put(&self) -> PreparedPut {
        PreparedPut::new(self.clone())
    }

    pub fn get(&self) -> PreparedGet {
        PreparedGet::new(self.clone())
    }

    pub fn delete(&self) -> PreparedDelete {
        PreparedDelete::new(self.clone())
    }

    pub fn execute_sql(&self) -> PreparedExecuteSql {
        PreparedExecuteSql::new(self.clone())
    }

    /// Change sets touching any table or tag in `observed`.
    pub fn observe_changes(&self, observed: ObservedSet) -> BoxStream<'static, Changes> {
        self.low_level().subscribe_changes(observed)
    }

    pub fn observe_changes_in_tables<I, S>(&self, tables: I) -> BoxStream<'static, Changes>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = tables.into_iter().map(Into::into).collect();
        self.observe_changes(ObservedSet::new(tables, Default::default()))
    }

    pub fn observe_changes_of_tags<I, S>(&self, tags: I) -> BoxStream<'static, Changes>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        self.observe_changes(ObservedSet::new(Default::default(), tags))
    }

    /// Runs `f` inside a transaction on the calling thread.
    ///
    /// Operations executed by `f` join the transaction and their change
    /// notifications are sent once it commits.
    pub fn run_in_transaction<R>(
        &self,
        f: impl FnOnce(&SqliteStore) -> StowageResult<R>,
    ) -> StowageResult<R> {
        in_transaction(self.low_level(), || f(self))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("type_mappings", &self.inner.type_mappings)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

enum Backend {
    Config(StoreConfig),
    Connection(Connection),
    LowLevel(Arc<dyn LowLevel>),
}

/// First stage of building a store: where the data lives.
pub struct StoreBuilder;

impl StoreBuilder {
    /// Wraps an open connection as is.
    pub fn connection(self, conn: Connection) -> StoreCompleteBuilder {
        StoreCompleteBuilder::new(Backend::Connection(conn))
    }

    /// Uses a custom native call surface. Migrations are not supported.
    pub fn low_level(self, low_level: Arc<dyn LowLevel>) -> StoreCompleteBuilder {
        StoreCompleteBuilder::new(Backend::LowLevel(low_level))
    }

    /// Opens (creating if needed) the database file at `path`.
    pub fn open(self, path: impl Into<PathBuf>) -> StoreCompleteBuilder {
        StoreCompleteBuilder::new(Backend::Config(StoreConfig::at(path)))
    }

    pub fn in_memory(self) -> StoreCompleteBuilder {
        StoreCompleteBuilder::new(Backend::Config(StoreConfig::default()))
    }

    pub fn config(self, config: &StoreConfig) -> StoreCompleteBuilder {
        StoreCompleteBuilder::new(Backend::Config(config.clone()))
    }
}

/// Optional parts of a store.
pub struct StoreCompleteBuilder {
    backend: Backend,
    type_mappings: TypeMappings,
    scheduler: Scheduler,
    migrations: Vec<Migration>,
}

impl StoreCompleteBuilder {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            type_mappings: TypeMappings::new(),
            scheduler: Scheduler::default(),
            migrations: Vec::new(),
        }
    }

    pub fn add_type_mapping<T: Send + Sync + 'static>(self, mapping: TypeMapping<T>) -> Self {
        self.type_mappings.register(mapping);
        self
    }

    /// See [`TypeMappings::declare_subtype`].
    pub fn declare_subtype<C, P>(self) -> Self
    where
        C: AsRef<P> + From<P> + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        self.type_mappings.declare_subtype::<C, P>();
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Migrations applied by `build()`, in version order.
    pub fn migrations(mut self, migrations: Vec<Migration>) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn build(self) -> StowageResult<SqliteStore> {
        validate(&self.migrations)?;
        let low_level: Arc<dyn LowLevel> = match self.backend {
            Backend::Config(config) => Arc::new(migrated(
                SqliteLowLevel::open(&config)?,
                &self.migrations,
            )?),
            Backend::Connection(conn) => {
                Arc::new(migrated(SqliteLowLevel::new(conn), &self.migrations)?)
            }
            Backend::LowLevel(low_level) => {
                if !self.migrations.is_empty() {
                    return Err(StowageError::Config(
                        "migrations need a SQLite connection; run them before wrapping it".into(),
                    ));
                }
                low_level
            }
        };

        Ok(SqliteStore {
            inner: Arc::new(StoreInner {
                low_level,
                type_mappings: self.type_mappings,
                scheduler: self.scheduler,
            }),
        })
    }
}

fn migrated(low_level: SqliteLowLevel, migrations: &[Migration]) -> StowageResult<SqliteLowLevel> {
    if migrations.is_empty() {
        return Ok(low_level);
    }
    let applied = low_level.with_connection(|conn| run_migrations(conn, migrations))?;
    info!(applied = applied.len(), "Store ready");
    Ok(low_level)
}
