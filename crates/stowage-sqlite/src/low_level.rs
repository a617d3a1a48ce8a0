//! Native call surface of the store.
//!
//! Every resolver reaches SQLite through [`LowLevel`]. The trait is object
//! safe so tests can wrap the real implementation and count calls.
//!
//! `SqliteLowLevel` owns a single connection behind a mutex. Transactions
//! nest: every level must be marked successful before it ends, otherwise
//! the outermost end rolls everything back. While a thread has a
//! transaction open, other threads wait for it to finish and change
//! notifications from the owning thread are held back until commit.

use std::path::Path;
use std::thread::{self, ThreadId};

use futures_util::stream::BoxStream;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rusqlite::{params_from_iter, Connection};
use stowage_common::ValidationError;
use tracing::{debug, info, warn};

use crate::changes::{Changes, ObservedSet};
use crate::config::StoreConfig;
use crate::cursor::Cursor;
use crate::notifier::{ChangeBus, DEFAULT_CHANGES_CAPACITY};
use crate::queries::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};
use crate::values::ContentValues;
use crate::{StowageError, StowageResult};

/// Native operations the prepared operations are built from.
pub trait LowLevel: Send + Sync {
    /// Runs a structured select.
    fn query(&self, query: &Query) -> StowageResult<Cursor>;

    /// Runs arbitrary SQL and returns its rows.
    fn raw_query(&self, query: &RawQuery) -> StowageResult<Cursor>;

    /// Inserts one row and returns its rowid.
    fn insert(&self, query: &InsertQuery, values: &ContentValues) -> StowageResult<i64>;

    /// Updates matching rows and returns how many changed.
    fn update(&self, query: &UpdateQuery, values: &ContentValues) -> StowageResult<usize>;

    /// Deletes matching rows and returns how many were removed.
    fn delete(&self, query: &DeleteQuery) -> StowageResult<usize>;

    /// Executes SQL for its side effects. Any rows it yields are discarded.
    fn execute_sql(&self, query: &RawQuery) -> StowageResult<()>;

    fn begin_transaction(&self) -> StowageResult<()>;

    /// Marks the innermost open transaction as successful.
    fn set_transaction_successful(&self) -> StowageResult<()>;

    /// Ends the innermost open transaction, committing or rolling back
    /// when it is the outermost one.
    fn end_transaction(&self) -> StowageResult<()>;

    /// Publishes `changes`, or defers them to commit when the calling
    /// thread has a transaction open.
    fn notify_about_changes(&self, changes: Changes);

    /// Stream of published changes intersecting `observed`.
    fn subscribe_changes(&self, observed: ObservedSet) -> BoxStream<'static, Changes>;
}

struct Session {
    conn: Connection,
    /// Thread that holds the open transaction.
    owner: Option<ThreadId>,
    /// One entry per nesting level: whether it was marked successful.
    levels: Vec<bool>,
    /// An inner level ended without being marked successful.
    rollback_only: bool,
    /// Changes raised inside the open transaction.
    pending: Changes,
}

impl Session {
    fn owned_by_current_thread(&self) -> bool {
        self.owner == Some(thread::current().id())
    }
}

/// [`LowLevel`] over one `rusqlite::Connection`.
pub struct SqliteLowLevel {
    session: Mutex<Session>,
    released: Condvar,
    bus: ChangeBus,
}

impl SqliteLowLevel {
    pub fn new(conn: Connection) -> Self {
        Self::with_bus(conn, ChangeBus::new(DEFAULT_CHANGES_CAPACITY))
    }

    pub fn with_bus(conn: Connection, bus: ChangeBus) -> Self {
        Self {
            session: Mutex::new(Session {
                conn,
                owner: None,
                levels: Vec::new(),
                rollback_only: false,
                pending: Changes::default(),
            }),
            released: Condvar::new(),
            bus,
        }
    }

    /// Opens the database described by `config` and applies its pragmas.
    pub fn open(config: &StoreConfig) -> StowageResult<Self> {
        let conn = match &config.path {
            Some(path) => open_file(path)?,
            None => {
                info!("Opening in-memory database");
                Connection::open_in_memory()?
            }
        };
        conn.execute_batch(&config.pragmas())?;
        Ok(Self::with_bus(conn, ChangeBus::new(config.changes_capacity)))
    }

    pub fn open_in_memory() -> StowageResult<Self> {
        Self::open(&StoreConfig::default())
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Runs `f` with the connection, outside of any prepared operation.
    ///
    /// Waits while another thread has a transaction open.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> StowageResult<R>,
    ) -> StowageResult<R> {
        let session = self.lock();
        f(&session.conn)
    }

    /// Nesting depth of the open transaction; zero when none is open.
    pub fn transaction_depth(&self) -> usize {
        self.session.lock().levels.len()
    }

    /// Locks the session, waiting while another thread owns a transaction.
    fn lock(&self) -> MutexGuard<'_, Session> {
        let mut session = self.session.lock();
        let me = thread::current().id();
        while session.owner.is_some_and(|owner| owner != me) {
            self.released.wait(&mut session);
        }
        session
    }

    fn finish(&self, session: &mut Session) -> StowageResult<Changes> {
        let rollback = std::mem::take(&mut session.rollback_only);
        let pending = std::mem::take(&mut session.pending);
        session.owner = None;
        self.released.notify_all();

        if rollback {
            session.conn.execute_batch("ROLLBACK")?;
            if !pending.is_empty() {
                warn!(%pending, "Transaction rolled back, dropping changes");
            } else {
                warn!("Transaction rolled back");
            }
            return Ok(Changes::default());
        }

        if let Err(e) = session.conn.execute_batch("COMMIT") {
            warn!(error = %e, "Commit failed, rolling back");
            if !session.conn.is_autocommit() {
                if let Err(rollback_err) = session.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_err, "Rollback after failed commit failed");
                }
            }
            return Err(e.into());
        }
        debug!("Transaction committed");
        Ok(pending)
    }
}

fn open_file(path: &Path) -> StowageResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!(path = %path.display(), "Opening database");
    Ok(Connection::open(path)?)
}

fn insert_sql(query: &InsertQuery, values: &ContentValues) -> String {
    if values.is_empty() {
        return match query.null_column_hack() {
            Some(column) => format!("INSERT INTO {} ({column}) VALUES (NULL)", query.table()),
            None => format!("INSERT INTO {} DEFAULT VALUES", query.table()),
        };
    }
    let columns: Vec<&str> = values.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        query.table(),
        columns.join(", ")
    )
}

fn update_sql(query: &UpdateQuery, values: &ContentValues) -> String {
    let assignments: Vec<String> = values.columns().map(|c| format!("{c} = ?")).collect();
    let mut sql = format!("UPDATE {} SET {}", query.table(), assignments.join(", "));
    push_where(&mut sql, query.where_clause());
    sql
}

fn delete_sql(query: &DeleteQuery) -> String {
    let mut sql = format!("DELETE FROM {}", query.table());
    push_where(&mut sql, query.where_clause());
    sql
}

fn push_where(sql: &mut String, clause: Option<&str>) {
    if let Some(clause) = clause.filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}

impl LowLevel for SqliteLowLevel {
    fn query(&self, query: &Query) -> StowageResult<Cursor> {
        let sql = query.to_sql();
        let session = self.lock();
        let mut statement = session.conn.prepare(&sql)?;
        let cursor = Cursor::query(&mut statement, params_from_iter(query.where_args()))?;
        debug!(table = query.table(), rows = cursor.len(), "query");
        Ok(cursor)
    }

    fn raw_query(&self, query: &RawQuery) -> StowageResult<Cursor> {
        let session = self.lock();
        let mut statement = session.conn.prepare(query.sql())?;
        let cursor = Cursor::query(&mut statement, params_from_iter(query.args()))?;
        debug!(sql = query.sql(), rows = cursor.len(), "raw query");
        Ok(cursor)
    }

    fn insert(&self, query: &InsertQuery, values: &ContentValues) -> StowageResult<i64> {
        let sql = insert_sql(query, values);
        let session = self.lock();
        session
            .conn
            .execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))?;
        let id = session.conn.last_insert_rowid();
        debug!(table = query.table(), id, "insert");
        Ok(id)
    }

    fn update(&self, query: &UpdateQuery, values: &ContentValues) -> StowageResult<usize> {
        if values.is_empty() {
            return Err(ValidationError::EmptyValues {
                table: query.table().to_string(),
            }
            .into());
        }
        let sql = update_sql(query, values);
        let params = values
            .iter()
            .map(|(_, v)| v)
            .chain(query.where_args().iter());
        let session = self.lock();
        let rows = session.conn.execute(&sql, params_from_iter(params))?;
        debug!(table = query.table(), rows, "update");
        Ok(rows)
    }

    fn delete(&self, query: &DeleteQuery) -> StowageResult<usize> {
        let sql = delete_sql(query);
        let session = self.lock();
        let rows = session
            .conn
            .execute(&sql, params_from_iter(query.where_args()))?;
        debug!(table = query.table(), rows, "delete");
        Ok(rows)
    }

    fn execute_sql(&self, query: &RawQuery) -> StowageResult<()> {
        let session = self.lock();
        if query.args().is_empty() {
            session.conn.execute_batch(query.sql())?;
        } else {
            let mut statement = session.conn.prepare(query.sql())?;
            let mut rows = statement.query(params_from_iter(query.args()))?;
            while rows.next()?.is_some() {}
        }
        debug!(sql = query.sql(), "execute sql");
        Ok(())
    }

    fn begin_transaction(&self) -> StowageResult<()> {
        let mut session = self.lock();
        if session.levels.is_empty() {
            session.conn.execute_batch("BEGIN IMMEDIATE")?;
            session.owner = Some(thread::current().id());
            session.rollback_only = false;
            session.pending = Changes::default();
        }
        session.levels.push(false);
        debug!(depth = session.levels.len(), "begin transaction");
        Ok(())
    }

    fn set_transaction_successful(&self) -> StowageResult<()> {
        let mut session = self.lock();
        if !session.owned_by_current_thread() {
            return Err(StowageError::Transaction(
                "no transaction in progress on this thread".into(),
            ));
        }
        match session.levels.last_mut() {
            Some(successful) if !*successful => {
                *successful = true;
                Ok(())
            }
            Some(_) => Err(StowageError::Transaction(
                "transaction already marked successful".into(),
            )),
            None => Err(StowageError::Transaction(
                "no transaction in progress on this thread".into(),
            )),
        }
    }

    fn end_transaction(&self) -> StowageResult<()> {
        let mut session = self.lock();
        if !session.owned_by_current_thread() {
            return Err(StowageError::Transaction(
                "no transaction in progress on this thread".into(),
            ));
        }
        let successful = session.levels.pop().unwrap_or(false);
        if !successful {
            session.rollback_only = true;
        }
        debug!(depth = session.levels.len(), successful, "end transaction");
        if !session.levels.is_empty() {
            return Ok(());
        }

        let changes = self.finish(&mut session);
        drop(session);
        self.bus.notify(changes?);
        Ok(())
    }

    fn notify_about_changes(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        let mut session = self.session.lock();
        if session.owned_by_current_thread() {
            session.pending.merge(changes);
            return;
        }
        drop(session);
        self.bus.notify(changes);
    }

    fn subscribe_changes(&self, observed: ObservedSet) -> BoxStream<'static, Changes> {
        self.bus.observe(observed)
    }
}

impl std::fmt::Debug for SqliteLowLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLowLevel")
            .field("subscribers", &self.bus.subscriber_count())
            .finish_non_exhaustive()
    }
}
