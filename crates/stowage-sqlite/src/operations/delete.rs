//! Delete: remove objects or rows matching a query.

use std::sync::Arc;

use tracing::debug;

use super::delete_result::{DeleteResult, DeleteResults};
use super::{run_batch, PreparedOperation, Storable};
use crate::changes::Changes;
use crate::queries::DeleteQuery;
use crate::store::SqliteStore;
use crate::StowageResult;

/// Deletes the row an object is stored in.
pub trait DeleteResolver<T>: Send + Sync {
    fn perform_delete(&self, store: &SqliteStore, object: &T) -> StowageResult<DeleteResult>;
}

/// Maps an object onto the query [`DefaultDeleteResolver`] runs.
pub trait DeleteMapper<T>: Send + Sync {
    fn map_to_delete_query(&self, object: &T) -> StowageResult<DeleteQuery>;
}

/// Delete resolver that runs the mapped delete query.
#[derive(Debug, Clone, Default)]
pub struct DefaultDeleteResolver<M> {
    mapper: M,
}

impl<M> DefaultDeleteResolver<M> {
    pub fn new(mapper: M) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<T, M: DeleteMapper<T>> DeleteResolver<T> for DefaultDeleteResolver<M> {
    fn perform_delete(&self, store: &SqliteStore, object: &T) -> StowageResult<DeleteResult> {
        let query = self.mapper.map_to_delete_query(object)?;
        let rows = store.low_level().delete(&query)?;
        Ok(DeleteResult::new(
            rows,
            query.table(),
            query.affects_tags().iter().cloned(),
        ))
    }
}

fn changes_of(result: &DeleteResult) -> Option<Changes> {
    result.was_deleted().then(|| result.changes())
}

fn resolve<T: Storable>(
    store: &SqliteStore,
    explicit: &Option<Arc<dyn DeleteResolver<T>>>,
) -> StowageResult<Arc<dyn DeleteResolver<T>>> {
    match explicit {
        Some(resolver) => Ok(Arc::clone(resolver)),
        None => Ok(Arc::clone(store.type_mapping::<T>()?.delete_resolver())),
    }
}

/// Entry point of delete operations.
#[derive(Clone)]
pub struct PreparedDelete {
    store: SqliteStore,
}

impl PreparedDelete {
    pub(crate) fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn object<T: Storable>(self, object: T) -> PreparedDeleteObjectBuilder<T> {
        PreparedDeleteObjectBuilder {
            store: self.store,
            object,
            resolver: None,
        }
    }

    pub fn objects<T: Storable>(
        self,
        objects: impl IntoIterator<Item = T>,
    ) -> PreparedDeleteObjectsBuilder<T> {
        PreparedDeleteObjectsBuilder {
            store: self.store,
            objects: objects.into_iter().collect(),
            resolver: None,
            use_transaction: true,
        }
    }

    pub fn by_query(self, query: DeleteQuery) -> PreparedDeleteByQueryBuilder {
        PreparedDeleteByQueryBuilder {
            store: self.store,
            query,
        }
    }
}

/// Optional parts of a single-object delete.
pub struct PreparedDeleteObjectBuilder<T> {
    store: SqliteStore,
    object: T,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
}

impl<T: Storable> PreparedDeleteObjectBuilder<T> {
    /// Uses `resolver` instead of the registered type mapping.
    pub fn with_delete_resolver(mut self, resolver: impl DeleteResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn prepare(self) -> PreparedDeleteObject<T> {
        PreparedDeleteObject {
            store: self.store,
            object: self.object,
            resolver: self.resolver,
        }
    }
}

/// Deletes one object.
pub struct PreparedDeleteObject<T> {
    store: SqliteStore,
    object: T,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
}

impl<T: Storable> Clone for PreparedDeleteObject<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            object: self.object.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Storable> PreparedOperation for PreparedDeleteObject<T> {
    type Output = DeleteResult;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<DeleteResult> {
        let run = || -> StowageResult<_> {
            let resolver = resolve(&self.store, &self.resolver)?;
            let result = resolver.perform_delete(&self.store, &self.object)?;
            if let Some(changes) = changes_of(&result) {
                self.store.low_level().notify_about_changes(changes);
            }
            Ok(result)
        };
        run().map_err(|e| e.in_operation("Delete", || format!("object = {:?}", self.object)))
    }
}

/// Optional parts of a batch delete.
pub struct PreparedDeleteObjectsBuilder<T> {
    store: SqliteStore,
    objects: Vec<T>,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
    use_transaction: bool,
}

impl<T: Storable> PreparedDeleteObjectsBuilder<T> {
    pub fn with_delete_resolver(mut self, resolver: impl DeleteResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Wrap the batch in one transaction. On by default.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    pub fn prepare(self) -> PreparedDeleteObjects<T> {
        PreparedDeleteObjects {
            store: self.store,
            objects: Arc::new(self.objects),
            resolver: self.resolver,
            use_transaction: self.use_transaction,
        }
    }
}

/// Deletes several objects, in order.
pub struct PreparedDeleteObjects<T> {
    store: SqliteStore,
    objects: Arc<Vec<T>>,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
    use_transaction: bool,
}

impl<T> Clone for PreparedDeleteObjects<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            objects: Arc::clone(&self.objects),
            resolver: self.resolver.clone(),
            use_transaction: self.use_transaction,
        }
    }
}

impl<T: Storable> PreparedOperation for PreparedDeleteObjects<T> {
    type Output = DeleteResults<T>;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<DeleteResults<T>> {
        let run = || -> StowageResult<_> {
            let resolver = resolve(&self.store, &self.resolver)?;
            debug!(
                objects = self.objects.len(),
                use_transaction = self.use_transaction,
                "delete objects"
            );
            run_batch(
                self.store.low_level(),
                &self.objects,
                self.use_transaction,
                |object| resolver.perform_delete(&self.store, object),
                changes_of,
            )
        };
        run().map(DeleteResults::new).map_err(|e| {
            e.in_operation("Delete", || format!("objects = {:?}", self.objects))
        })
    }
}

pub struct PreparedDeleteByQueryBuilder {
    store: SqliteStore,
    query: DeleteQuery,
}

impl PreparedDeleteByQueryBuilder {
    pub fn prepare(self) -> PreparedDeleteByQuery {
        PreparedDeleteByQuery {
            store: self.store,
            query: Arc::new(self.query),
        }
    }
}

/// Deletes every row matching a query.
#[derive(Clone)]
pub struct PreparedDeleteByQuery {
    store: SqliteStore,
    query: Arc<DeleteQuery>,
}

impl PreparedOperation for PreparedDeleteByQuery {
    type Output = DeleteResult;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<DeleteResult> {
        let run = || -> StowageResult<_> {
            let rows = self.store.low_level().delete(&self.query)?;
            let result = DeleteResult::new(
                rows,
                self.query.table(),
                self.query.affects_tags().iter().cloned(),
            );
            if let Some(changes) = changes_of(&result) {
                self.store.low_level().notify_about_changes(changes);
            }
            Ok(result)
        };
        run().map_err(|e| e.in_operation("Delete", || format!("query = {}", self.query)))
    }
}
