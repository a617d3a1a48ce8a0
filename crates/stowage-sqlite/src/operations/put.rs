//! Put: insert or update objects and raw values.

use std::sync::Arc;

use tracing::debug;

use super::put_result::{PutResult, PutResults};
use super::{run_batch, PreparedOperation, Storable};
use crate::changes::Changes;
use crate::queries::{InsertQuery, Query, UpdateQuery};
use crate::store::SqliteStore;
use crate::values::ContentValues;
use crate::StowageResult;

/// Writes one object.
pub trait PutResolver<T>: Send + Sync {
    fn perform_put(&self, store: &SqliteStore, object: &T) -> StowageResult<PutResult>;
}

/// Maps an object onto the queries and values [`DefaultPutResolver`] runs.
pub trait PutMapper<T>: Send + Sync {
    fn map_to_insert_query(&self, object: &T) -> StowageResult<InsertQuery>;

    /// Update whose predicate selects the row `object` is stored in.
    fn map_to_update_query(&self, object: &T) -> StowageResult<UpdateQuery>;

    fn map_to_content_values(&self, object: &T) -> StowageResult<ContentValues>;
}

/// Put resolver that updates when a row matches the update predicate and
/// inserts otherwise.
///
/// Putting an object twice gives an insert, then an update, provided the
/// key is filled in after the first put.
#[derive(Debug, Clone, Default)]
pub struct DefaultPutResolver<M> {
    mapper: M,
}

impl<M> DefaultPutResolver<M> {
    pub fn new(mapper: M) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<T, M: PutMapper<T>> PutResolver<T> for DefaultPutResolver<M> {
    fn perform_put(&self, store: &SqliteStore, object: &T) -> StowageResult<PutResult> {
        let update_query = self.mapper.map_to_update_query(object)?;
        let mut existing = Query::builder()
            .table(update_query.table())
            .where_args(update_query.where_args().iter().cloned());
        if let Some(clause) = update_query.where_clause() {
            existing = existing.where_clause(clause);
        }
        let existing = store.low_level().query(&existing.build()?)?;
        let values = self.mapper.map_to_content_values(object)?;

        if existing.is_empty() {
            let insert_query = self.mapper.map_to_insert_query(object)?;
            let id = store.low_level().insert(&insert_query, &values)?;
            Ok(PutResult::new_insert_result(
                id,
                insert_query.table(),
                insert_query.affects_tags().iter().cloned(),
            ))
        } else {
            let rows = store.low_level().update(&update_query, &values)?;
            Ok(PutResult::new_update_result(
                rows,
                update_query.table(),
                update_query.affects_tags().iter().cloned(),
            ))
        }
    }
}

/// Entry point of put operations.
#[derive(Clone)]
pub struct PreparedPut {
    store: SqliteStore,
}

impl PreparedPut {
    pub(crate) fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn object<T: Storable>(self, object: T) -> PreparedPutObjectBuilder<T> {
        PreparedPutObjectBuilder {
            store: self.store,
            object,
            resolver: None,
        }
    }

    pub fn objects<T: Storable>(self, objects: impl IntoIterator<Item = T>) -> PreparedPutObjectsBuilder<T> {
        PreparedPutObjectsBuilder {
            store: self.store,
            objects: objects.into_iter().collect(),
            resolver: None,
            use_transaction: true,
        }
    }

    pub fn content_values(self, values: ContentValues) -> PreparedPutContentValuesBuilder {
        PreparedPutContentValuesBuilder {
            store: self.store,
            values,
        }
    }

    pub fn content_values_iter(
        self,
        values: impl IntoIterator<Item = ContentValues>,
    ) -> PreparedPutContentValuesIterBuilder {
        PreparedPutContentValuesIterBuilder {
            store: self.store,
            values: values.into_iter().collect(),
        }
    }
}

fn resolve<T: Storable>(
    store: &SqliteStore,
    explicit: &Option<Arc<dyn PutResolver<T>>>,
) -> StowageResult<Arc<dyn PutResolver<T>>> {
    match explicit {
        Some(resolver) => Ok(Arc::clone(resolver)),
        None => Ok(Arc::clone(store.type_mapping::<T>()?.put_resolver())),
    }
}

fn changes_of(result: &PutResult) -> Option<Changes> {
    result.changed_anything().then(|| result.changes())
}

/// Optional parts of a single-object put.
pub struct PreparedPutObjectBuilder<T> {
    store: SqliteStore,
    object: T,
    resolver: Option<Arc<dyn PutResolver<T>>>,
}

impl<T: Storable> PreparedPutObjectBuilder<T> {
    /// Uses `resolver` instead of the registered type mapping.
    pub fn with_put_resolver(mut self, resolver: impl PutResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn prepare(self) -> PreparedPutObject<T> {
        PreparedPutObject {
            store: self.store,
            object: self.object,
            resolver: self.resolver,
        }
    }
}

/// Puts one object.
pub struct PreparedPutObject<T> {
    store: SqliteStore,
    object: T,
    resolver: Option<Arc<dyn PutResolver<T>>>,
}

impl<T: Storable> Clone for PreparedPutObject<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            object: self.object.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Storable> PreparedPutObject<T> {
    fn run(&self) -> StowageResult<PutResult> {
        let resolver = resolve(&self.store, &self.resolver)?;
        let result = resolver.perform_put(&self.store, &self.object)?;
        if let Some(changes) = changes_of(&result) {
            self.store.low_level().notify_about_changes(changes);
        }
        Ok(result)
    }
}

impl<T: Storable> PreparedOperation for PreparedPutObject<T> {
    type Output = PutResult;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<PutResult> {
        self.run()
            .map_err(|e| e.in_operation("Put", || format!("object = {:?}", self.object)))
    }
}

/// Optional parts of a batch put.
pub struct PreparedPutObjectsBuilder<T> {
    store: SqliteStore,
    objects: Vec<T>,
    resolver: Option<Arc<dyn PutResolver<T>>>,
    use_transaction: bool,
}

impl<T: Storable> PreparedPutObjectsBuilder<T> {
    pub fn with_put_resolver(mut self, resolver: impl PutResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Wrap the batch in one transaction. On by default.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    pub fn prepare(self) -> PreparedPutObjects<T> {
        PreparedPutObjects {
            store: self.store,
            objects: Arc::new(self.objects),
            resolver: self.resolver,
            use_transaction: self.use_transaction,
        }
    }
}

/// Puts several objects, in order.
pub struct PreparedPutObjects<T> {
    store: SqliteStore,
    objects: Arc<Vec<T>>,
    resolver: Option<Arc<dyn PutResolver<T>>>,
    use_transaction: bool,
}

impl<T> Clone for PreparedPutObjects<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            objects: Arc::clone(&self.objects),
            resolver: self.resolver.clone(),
            use_transaction: self.use_transaction,
        }
    }
}

impl<T: Storable> PreparedOperation for PreparedPutObjects<T> {
    type Output = PutResults<T>;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<PutResults<T>> {
        let run = || -> StowageResult<_> {
            let resolver = resolve(&self.store, &self.resolver)?;
            debug!(
                objects = self.objects.len(),
                use_transaction = self.use_transaction,
                "put objects"
            );
            run_batch(
                self.store.low_level(),
                &self.objects,
                self.use_transaction,
                |object| resolver.perform_put(&self.store, object),
                changes_of,
            )
        };
        run().map(PutResults::new).map_err(|e| {
            e.in_operation("Put", || format!("objects = {:?}", self.objects))
        })
    }
}

/// First stage of a content-values put: the resolver is required.
pub struct PreparedPutContentValuesBuilder {
    store: SqliteStore,
    values: ContentValues,
}

impl PreparedPutContentValuesBuilder {
    pub fn with_put_resolver(
        self,
        resolver: impl PutResolver<ContentValues> + 'static,
    ) -> PreparedPutContentValuesCompleteBuilder {
        PreparedPutContentValuesCompleteBuilder {
            store: self.store,
            values: self.values,
            resolver: Arc::new(resolver),
        }
    }
}

pub struct PreparedPutContentValuesCompleteBuilder {
    store: SqliteStore,
    values: ContentValues,
    resolver: Arc<dyn PutResolver<ContentValues>>,
}

impl PreparedPutContentValuesCompleteBuilder {
    pub fn prepare(self) -> PreparedPutContentValues {
        PreparedPutContentValues {
            store: self.store,
            values: self.values,
            resolver: self.resolver,
        }
    }
}

/// Puts one set of raw values.
#[derive(Clone)]
pub struct PreparedPutContentValues {
    store: SqliteStore,
    values: ContentValues,
    resolver: Arc<dyn PutResolver<ContentValues>>,
}

impl PreparedOperation for PreparedPutContentValues {
    type Output = PutResult;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<PutResult> {
        let run = || -> StowageResult<_> {
            let result = self.resolver.perform_put(&self.store, &self.values)?;
            if let Some(changes) = changes_of(&result) {
                self.store.low_level().notify_about_changes(changes);
            }
            Ok(result)
        };
        run().map_err(|e| e.in_operation("Put", || format!("contentValues = {}", self.values)))
    }
}

/// First stage of a batch content-values put: the resolver is required.
pub struct PreparedPutContentValuesIterBuilder {
    store: SqliteStore,
    values: Vec<ContentValues>,
}

impl PreparedPutContentValuesIterBuilder {
    pub fn with_put_resolver(
        self,
        resolver: impl PutResolver<ContentValues> + 'static,
    ) -> PreparedPutContentValuesIterCompleteBuilder {
        PreparedPutContentValuesIterCompleteBuilder {
            store: self.store,
            values: self.values,
            resolver: Arc::new(resolver),
            use_transaction: true,
        }
    }
}

pub struct PreparedPutContentValuesIterCompleteBuilder {
    store: SqliteStore,
    values: Vec<ContentValues>,
    resolver: Arc<dyn PutResolver<ContentValues>>,
    use_transaction: bool,
}

impl PreparedPutContentValuesIterCompleteBuilder {
    /// Wrap the batch in one transaction. On by default.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    pub fn prepare(self) -> PreparedPutContentValuesIter {
        PreparedPutContentValuesIter {
            store: self.store,
            values: Arc::new(self.values),
            resolver: self.resolver,
            use_transaction: self.use_transaction,
        }
    }
}

/// Puts several sets of raw values, in order.
#[derive(Clone)]
pub struct PreparedPutContentValuesIter {
    store: SqliteStore,
    values: Arc<Vec<ContentValues>>,
    resolver: Arc<dyn PutResolver<ContentValues>>,
    use_transaction: bool,
}

impl PreparedOperation for PreparedPutContentValuesIter {
    type Output = PutResults<ContentValues>;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<PutResults<ContentValues>> {
        run_batch(
            self.store.low_level(),
            &self.values,
            self.use_transaction,
            |values| self.resolver.perform_put(&self.store, values),
            changes_of,
        )
        .map(PutResults::new)
        .map_err(|e| {
            e.in_operation("Put", || {
                let values: Vec<String> = self.values.iter().map(ToString::to_string).collect();
                format!("contentValues = [{}]", values.join(", "))
            })
        })
    }
}
