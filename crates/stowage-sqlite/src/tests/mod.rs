//! Integration tests for the SQLite store.
//!
//! - `registry.rs`     - Type mapping lookup, subtypes, missing mappings
//! - `put.rs`          - Insert-or-update, batches, content values
//! - `get.rs`          - Lists, first/last objects, cursors, counts
//! - `delete.rs`       - Object, batch and query deletes
//! - `execute.rs`      - Raw SQL and its notifications
//! - `transactions.rs` - Transaction protocol and deferred notifications
//! - `live.rs`         - Async wrappers and live queries
//! - `round_trip.rs`   - Every column type through put and get

mod delete;
mod put;
mod transactions;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::stream::BoxStream;

use crate::changes::{Changes, ObservedSet};
use crate::cursor::{Cursor, CursorRow};
use crate::entity::SqliteEntity;
use crate::low_level::{LowLevel, SqliteLowLevel};
use crate::migrations::Migration;
use crate::operations::PreparedOperation;
use crate::queries::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};
use crate::store::SqliteStore;
use crate::type_mapping::TypeMapping;
use crate::values::ContentValues;
use crate::{ColumnMeta, ColumnType, StowageResult, TableMeta};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct User {
    pub id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: None,
        }
    }

    pub fn with_id(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            ..Self::new(name)
        }
    }
}

impl SqliteEntity for User {
    fn table_meta() -> &'static TableMeta {
        static META: OnceLock<TableMeta> = OnceLock::new();
        META.get_or_init(|| {
            TableMeta::new(
                "users",
                vec![
                    ColumnMeta::new("id", ColumnType::Long).key().nullable(),
                    ColumnMeta::new("name", ColumnType::String),
                    ColumnMeta::new("email", ColumnType::String)
                        .nullable()
                        .ignore_null(),
                ],
            )
            .unwrap()
        })
    }

    fn to_content_values(&self) -> StowageResult<ContentValues> {
        ContentValues::new()
            .with("id", self.id)?
            .with("name", self.name.as_str())?
            .with("email", self.email.as_deref())
    }

    fn from_row(row: &CursorRow<'_>) -> StowageResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
        })
    }
}

/// Store with the `users` table and the `User` mapping registered.
pub(crate) fn user_store() -> SqliteStore {
    SqliteStore::builder()
        .in_memory()
        .add_type_mapping(TypeMapping::<User>::for_entity())
        .migrations(vec![Migration::create_table(1, User::table_meta())])
        .build()
        .unwrap()
}

/// Store over a [`CountingLowLevel`] with the `users` table created.
pub(crate) fn counting_store() -> (SqliteStore, Arc<CountingLowLevel>) {
    let inner = SqliteLowLevel::open_in_memory().unwrap();
    inner
        .with_connection(|conn| {
            conn.execute_batch(&User::table_meta().create_table_sql())?;
            Ok(())
        })
        .unwrap();
    let counting = Arc::new(CountingLowLevel::new(inner));
    let store = SqliteStore::builder()
        .low_level(counting.clone())
        .add_type_mapping(TypeMapping::<User>::for_entity())
        .build()
        .unwrap();
    (store, counting)
}

pub(crate) fn all_users() -> Query {
    Query::builder().table("users").order_by("id").build().unwrap()
}

pub(crate) fn list_users(store: &SqliteStore) -> Vec<User> {
    store
        .get()
        .list_of_objects::<User>()
        .with_query(all_users())
        .prepare()
        .execute()
        .unwrap()
}

pub(crate) fn count_users(store: &SqliteStore) -> usize {
    store
        .get()
        .number_of_results()
        .with_query(Query::builder().table("users").build().unwrap())
        .prepare()
        .execute()
        .unwrap()
}

/// Inserts `names` one by one and returns the stored users.
pub(crate) fn seed_users(store: &SqliteStore, names: &[&str]) -> Vec<User> {
    for name in names {
        store.put().object(User::new(name)).prepare().execute().unwrap();
    }
    list_users(store)
}

/// [`LowLevel`] wrapper that counts transaction and notification calls.
pub(crate) struct CountingLowLevel {
    inner: SqliteLowLevel,
    pub begins: AtomicUsize,
    pub successes: AtomicUsize,
    pub ends: AtomicUsize,
    pub notifications: AtomicUsize,
}

impl CountingLowLevel {
    pub fn new(inner: SqliteLowLevel) -> Self {
        Self {
            inner,
            begins: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
            notifications: AtomicUsize::new(0),
        }
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl LowLevel for CountingLowLevel {
    fn query(&self, query: &Query) -> StowageResult<Cursor> {
        self.inner.query(query)
    }

    fn raw_query(&self, query: &RawQuery) -> StowageResult<Cursor> {
        self.inner.raw_query(query)
    }

    fn insert(&self, query: &InsertQuery, values: &ContentValues) -> StowageResult<i64> {
        self.inner.insert(query, values)
    }

    fn update(&self, query: &UpdateQuery, values: &ContentValues) -> StowageResult<usize> {
        self.inner.update(query, values)
    }

    fn delete(&self, query: &DeleteQuery) -> StowageResult<usize> {
        self.inner.delete(query)
    }

    fn execute_sql(&self, query: &RawQuery) -> StowageResult<()> {
        self.inner.execute_sql(query)
    }

    fn begin_transaction(&self) -> StowageResult<()> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin_transaction()
    }

    fn set_transaction_successful(&self) -> StowageResult<()> {
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_transaction_successful()
    }

    fn end_transaction(&self) -> StowageResult<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.inner.end_transaction()
    }

    fn notify_about_changes(&self, changes: Changes) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        self.inner.notify_about_changes(changes)
    }

    fn subscribe_changes(&self, observed: ObservedSet) -> BoxStream<'static, Changes> {
        self.inner.subscribe_changes(observed)
    }
}

/// Basic workflow: create, read back, update, delete.
#[test]
fn basic_workflow() {
    let store = user_store();

    let put = store
        .put()
        .object(User::new("ada"))
        .prepare()
        .execute()
        .unwrap();
    assert!(put.was_inserted());
    let id = put.inserted_id().unwrap();

    let mut ada = store
        .get()
        .object::<User>()
        .with_query(
            Query::builder()
                .table("users")
                .where_clause("id = ?")
                .where_args([id])
                .build()
                .unwrap(),
        )
        .prepare()
        .execute()
        .unwrap()
        .unwrap();
    assert_eq!(ada.name, "ada");

    ada.email = Some("ada@example.com".into());
    let put = store.put().object(ada.clone()).prepare().execute().unwrap();
    assert!(put.was_updated());
    assert_eq!(list_users(&store), vec![ada.clone()]);

    let deleted = store.delete().object(ada).prepare().execute().unwrap();
    assert_eq!(deleted.rows_deleted(), 1);
    assert_eq!(count_users(&store), 0);
}
