//! Get: read objects, cursors and counts.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::BoxStream;

use super::live::observe;
use super::{ObservableOperation, PreparedOperation, Storable};
use crate::changes::ObservedSet;
use crate::cursor::{Cursor, CursorRow};
use crate::queries::{Query, RawQuery};
use crate::store::SqliteStore;
use crate::{StowageError, StowageResult};

/// Reads rows and maps them to objects.
pub trait GetResolver<T>: Send + Sync {
    fn map_from_cursor(&self, store: &SqliteStore, row: &CursorRow<'_>) -> StowageResult<T>;

    fn perform_get(&self, store: &SqliteStore, query: &Query) -> StowageResult<Cursor> {
        store.low_level().query(query)
    }

    fn perform_raw_get(&self, store: &SqliteStore, query: &RawQuery) -> StowageResult<Cursor> {
        store.low_level().raw_query(query)
    }
}

/// What a get reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum GetSource {
    Query(Query),
    Raw(RawQuery),
}

impl GetSource {
    /// Tables and tags whose changes make this read stale.
    pub fn observed(&self) -> ObservedSet {
        match self {
            GetSource::Query(query) => ObservedSet::new(
                [query.table().to_string()].into(),
                query.observes_tags().clone(),
            ),
            GetSource::Raw(query) => ObservedSet::new(
                query.observes_tables().clone(),
                query.observes_tags().clone(),
            ),
        }
    }

    fn cursor_with<T>(
        &self,
        store: &SqliteStore,
        resolver: &dyn GetResolver<T>,
    ) -> StowageResult<Cursor> {
        match self {
            GetSource::Query(query) => resolver.perform_get(store, query),
            GetSource::Raw(query) => resolver.perform_raw_get(store, query),
        }
    }

    fn cursor(&self, store: &SqliteStore) -> StowageResult<Cursor> {
        match self {
            GetSource::Query(query) => store.low_level().query(query),
            GetSource::Raw(query) => store.low_level().raw_query(query),
        }
    }

    /// `SELECT COUNT(*)` over the rows this source yields.
    fn count_query(&self) -> StowageResult<RawQuery> {
        let (sql, args) = match self {
            GetSource::Query(query) => (query.to_sql(), query.where_args().to_vec()),
            GetSource::Raw(query) => (query.sql().to_string(), query.args().to_vec()),
        };
        Ok(RawQuery::builder()
            .query(format!("SELECT COUNT(*) FROM ({sql})"))
            .args(args)
            .build()?)
    }
}

impl fmt::Display for GetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GetSource::Query(query) => write!(f, "query = {query}"),
            GetSource::Raw(query) => write!(f, "rawQuery = {query}"),
        }
    }
}

/// Entry point of get operations.
#[derive(Clone)]
pub struct PreparedGet {
    store: SqliteStore,
}

impl PreparedGet {
    pub(crate) fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// All matching rows as objects.
    pub fn list_of_objects<T: Storable>(self) -> GetBuilder<ListOfObjects<T>> {
        GetBuilder::new(self.store, ListOfObjects { resolver: None })
    }

    /// The first matching row as an object.
    pub fn object<T: Storable>(self) -> GetBuilder<SingleObject<T>> {
        GetBuilder::new(
            self.store,
            SingleObject {
                position: Position::First,
                resolver: None,
            },
        )
    }

    /// The last matching row as an object.
    pub fn last_object<T: Storable>(self) -> GetBuilder<SingleObject<T>> {
        GetBuilder::new(
            self.store,
            SingleObject {
                position: Position::Last,
                resolver: None,
            },
        )
    }

    /// The matching rows as they are.
    pub fn cursor(self) -> GetBuilder<CursorKind> {
        GetBuilder::new(self.store, CursorKind)
    }

    /// How many rows match.
    pub fn number_of_results(self) -> GetBuilder<NumberOfResults> {
        GetBuilder::new(self.store, NumberOfResults)
    }
}

/// First stage of a get: the query is required.
pub struct GetBuilder<K> {
    store: SqliteStore,
    kind: K,
}

impl<K> GetBuilder<K> {
    fn new(store: SqliteStore, kind: K) -> Self {
        Self { store, kind }
    }

    pub fn with_query(self, query: Query) -> GetCompleteBuilder<K> {
        self.with_source(GetSource::Query(query))
    }

    pub fn with_raw_query(self, query: RawQuery) -> GetCompleteBuilder<K> {
        self.with_source(GetSource::Raw(query))
    }

    fn with_source(self, source: GetSource) -> GetCompleteBuilder<K> {
        GetCompleteBuilder {
            store: self.store,
            kind: self.kind,
            source,
        }
    }
}

/// Optional parts of a get.
pub struct GetCompleteBuilder<K> {
    store: SqliteStore,
    kind: K,
    source: GetSource,
}

impl<K> GetCompleteBuilder<K> {
    pub fn prepare(self) -> PreparedGetOperation<K> {
        PreparedGetOperation {
            store: self.store,
            kind: self.kind,
            source: Arc::new(self.source),
        }
    }
}

impl<T: Storable> GetCompleteBuilder<ListOfObjects<T>> {
    /// Uses `resolver` instead of the registered type mapping.
    pub fn with_get_resolver(mut self, resolver: impl GetResolver<T> + 'static) -> Self {
        self.kind.resolver = Some(Arc::new(resolver));
        self
    }
}

impl<T: Storable> GetCompleteBuilder<SingleObject<T>> {
    /// Uses `resolver` instead of the registered type mapping.
    pub fn with_get_resolver(mut self, resolver: impl GetResolver<T> + 'static) -> Self {
        self.kind.resolver = Some(Arc::new(resolver));
        self
    }
}

/// A prepared read of kind `K`.
pub struct PreparedGetOperation<K> {
    store: SqliteStore,
    kind: K,
    source: Arc<GetSource>,
}

impl<K: Clone> Clone for PreparedGetOperation<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind.clone(),
            source: Arc::clone(&self.source),
        }
    }
}

impl<K> PreparedGetOperation<K> {
    pub fn source(&self) -> &GetSource {
        &self.source
    }

    fn wrap(&self, err: StowageError) -> StowageError {
        err.in_operation("Get", || self.source.to_string())
    }
}

fn resolve<T: Storable>(
    store: &SqliteStore,
    explicit: &Option<Arc<dyn GetResolver<T>>>,
) -> StowageResult<Arc<dyn GetResolver<T>>> {
    match explicit {
        Some(resolver) => Ok(Arc::clone(resolver)),
        None => Ok(Arc::clone(store.type_mapping::<T>()?.get_resolver())),
    }
}

/// Kind marker: every row mapped to `T`.
pub struct ListOfObjects<T> {
    resolver: Option<Arc<dyn GetResolver<T>>>,
}

impl<T> Clone for ListOfObjects<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    First,
    Last,
}

/// Kind marker: the first or last row mapped to `T`.
pub struct SingleObject<T> {
    position: Position,
    resolver: Option<Arc<dyn GetResolver<T>>>,
}

impl<T> Clone for SingleObject<T> {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            resolver: self.resolver.clone(),
        }
    }
}

/// Kind marker: raw rows.
#[derive(Debug, Clone, Copy)]
pub struct CursorKind;

/// Kind marker: row count.
#[derive(Debug, Clone, Copy)]
pub struct NumberOfResults;

pub type PreparedGetListOfObjects<T> = PreparedGetOperation<ListOfObjects<T>>;
pub type PreparedGetObject<T> = PreparedGetOperation<SingleObject<T>>;
pub type PreparedGetCursor = PreparedGetOperation<CursorKind>;
pub type PreparedGetNumberOfResults = PreparedGetOperation<NumberOfResults>;

impl<T: Storable> PreparedOperation for PreparedGetListOfObjects<T> {
    type Output = Vec<T>;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<Vec<T>> {
        let run = || -> StowageResult<_> {
            let resolver = resolve(&self.store, &self.kind.resolver)?;
            let cursor = self.source.cursor_with(&self.store, resolver.as_ref())?;
            cursor
                .rows()
                .map(|row| resolver.map_from_cursor(&self.store, &row))
                .collect::<StowageResult<Vec<T>>>()
        };
        run().map_err(|e| self.wrap(e))
    }
}

impl<T: Storable> PreparedOperation for PreparedGetObject<T> {
    type Output = Option<T>;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<Option<T>> {
        let run = || -> StowageResult<_> {
            let resolver = resolve(&self.store, &self.kind.resolver)?;
            let cursor = self.source.cursor_with(&self.store, resolver.as_ref())?;
            let row = match self.kind.position {
                Position::First => cursor.first(),
                Position::Last => cursor.last(),
            };
            row.map(|row| resolver.map_from_cursor(&self.store, &row))
                .transpose()
        };
        run().map_err(|e| self.wrap(e))
    }
}

impl PreparedOperation for PreparedGetCursor {
    type Output = Cursor;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<Cursor> {
        self.source.cursor(&self.store).map_err(|e| self.wrap(e))
    }
}

impl PreparedOperation for PreparedGetNumberOfResults {
    type Output = usize;

    fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn execute(&self) -> StowageResult<usize> {
        let run = || -> StowageResult<_> {
            let cursor = self.store.low_level().raw_query(&self.source.count_query()?)?;
            let count = match cursor.first() {
                Some(row) => row.get_at::<i64>(0)?,
                None => 0,
            };
            usize::try_from(count).map_err(|_| {
                StowageError::InvalidData(format!("negative row count {count}"))
            })
        };
        run().map_err(|e| self.wrap(e))
    }
}

impl<K> ObservableOperation for PreparedGetOperation<K>
where
    PreparedGetOperation<K>: PreparedOperation,
{
    fn observe(&self) -> StowageResult<BoxStream<'static, StowageResult<Self::Output>>> {
        observe(self.clone(), self.source.observed(), || self.source.to_string())
    }
}
