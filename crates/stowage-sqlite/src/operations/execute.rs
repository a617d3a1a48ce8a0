//! Execute SQL for its side effects.

use std::sync::Arc;

use super::PreparedOperation;
use crate::changes::Changes;
use crate::queries::RawQuery;
use crate::store::SqliteStore;
use crate::StowageResult;

/// Entry point of execute-SQL operations.
#[derive(Clone)]
pub struct PreparedExecuteSql {
    store: SqliteStore,
}

impl PreparedExecuteSql {
    pub(crate) fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn with_query(self, query: RawQuery) -> PreparedExecuteSqlBuilder {
        PreparedExecuteSqlBuilder {
            store: self.store,
            query,
        }
    }
}

pub struct PreparedExecuteSqlBuilder {
    store: SqliteStore,
    query: RawQuery,
}

impl PreparedExecuteSqlBuilder {
    pub fn prepare(self) -> PreparedExecuteSqlQuery {
        PreparedExecuteSqlQuery {
            store: self.store,
            query: Arc::new(self.query),
        }
    }
}

/// Runs one raw statement, then notifies the tables and tags it declares
/// as affected.
///
/// The native call reports no row count, so the notification is sent
/// whenever anything is declared.
#[derive(Clone)]
pub struct PreparedExecuteSqlQuery {
    store: SqliteStore,
    query: Arc<RawQuery>,
}

impl PreparedOperation for PreparedExecuteSqlQuery {
    type Output = ();

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<()> {
        let run = || -> StowageResult<_> {
            let low_level = self.store.low_level();
            low_level.execute_sql(&self.query)?;
            let changes = Changes::new(
                self.query.affects_tables().iter().cloned(),
                self.query.affects_tags().iter().cloned(),
            );
            if !changes.is_empty() {
                low_level.notify_about_changes(changes);
            }
            Ok(())
        };
        run().map_err(|e| e.in_operation("ExecuteSQL", || format!("query = {}", self.query)))
    }
}
