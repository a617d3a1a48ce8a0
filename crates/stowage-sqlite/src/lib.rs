//! # Stowage SQLite
//!
//! Typed put, get and delete operations over SQLite, with change
//! notifications and live queries.
//!
//! ## Principles
//!
//! - **Every operation is a value** - Built once, executed any number of
//!   times, blocking or async
//! - **Notifications reflect committed reality** - Batches notify once,
//!   after their transaction commits
//! - **Nothing changed, nothing sent** - Zero-row writes stay silent
//! - **Resolvers are explicit or registered** - An explicit resolver wins
//!   over the type mapping; no mapping at all is an error
//!
//! ## Flow
//!
//! ```text
//! WRITE:
//!   prepared op → resolver → LowLevel → SQLite → Changes → bus
//!
//! READ:
//!   prepared op → resolver → Cursor → objects
//!
//! LIVE:
//!   bus → matching Changes → re-run read → stream
//! ```
//!
//! ## Example
//!
//! ```rust
//! use stowage_sqlite::{PreparedOperation, Query, RawQuery, SqliteStore};
//!
//! let store = SqliteStore::builder().in_memory().build().unwrap();
//! store
//!     .execute_sql()
//!     .with_query(
//!         RawQuery::builder()
//!             .query("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT)")
//!             .build()
//!             .unwrap(),
//!     )
//!     .prepare()
//!     .execute()
//!     .unwrap();
//!
//! let count = store
//!     .get()
//!     .number_of_results()
//!     .with_query(Query::builder().table("tags").build().unwrap())
//!     .prepare()
//!     .execute()
//!     .unwrap();
//! assert_eq!(count, 0);
//! ```
//!
//! ## Crate Structure
//!
//! - [`store`] - The store handle and its builder
//! - [`operations`] - Prepared put, get, delete and execute-SQL operations
//! - [`type_mapping`] - Per-type resolver bundles
//! - [`entity`] - Resolvers derived from table metadata
//! - [`queries`] - Query value types
//! - [`low_level`] - Native call surface and transactions
//! - [`notifier`] - Change bus

pub mod changes;
pub mod config;
pub mod cursor;
pub mod entity;
mod error;
pub mod low_level;
pub mod migrations;
pub mod notifier;
pub mod operations;
pub mod queries;
pub mod store;
pub mod type_mapping;
pub mod values;

#[cfg(test)]
mod tests;

pub use changes::{Changes, ObservedSet};
pub use config::StoreConfig;
pub use cursor::{Cursor, CursorRow};
pub use entity::{EntityGetResolver, EntityMapper, SqliteEntity};
pub use error::{StowageError, StowageResult};
pub use low_level::{LowLevel, SqliteLowLevel};
pub use migrations::Migration;
pub use notifier::ChangeBus;
pub use operations::delete::{DefaultDeleteResolver, DeleteMapper, DeleteResolver};
pub use operations::delete_result::{DeleteResult, DeleteResults};
pub use operations::get::{GetResolver, GetSource};
pub use operations::put::{DefaultPutResolver, PutMapper, PutResolver};
pub use operations::put_result::{PutResult, PutResults};
pub use operations::{ObservableOperation, PreparedOperation, Storable};
pub use queries::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};
pub use store::SqliteStore;
pub use type_mapping::{TypeMapping, TypeMappings};
pub use values::ContentValues;

pub use stowage_common::{ColumnMeta, ColumnType, Scheduler, TableMeta, ValidationError};
