//! Typed mappings on top of the erased finder in `stowage-common`.
//!
//! A [`TypeMapping`] bundles the put, get and delete resolvers of one type.
//! Subtypes declared with [`TypeMappings::declare_subtype`] fall back to the
//! mapping of their nearest registered ancestor, seen through `AsRef` on the
//! way in and `From` on the way out.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use stowage_common::{ErasedMapping, MappingAdapter, TypeKey, TypeMappingFinder};

use crate::cursor::{Cursor, CursorRow};
use crate::entity::{EntityDeleteResolver, EntityGetResolver, EntityPutResolver, SqliteEntity};
use crate::operations::delete::DeleteResolver;
use crate::operations::delete_result::DeleteResult;
use crate::operations::get::GetResolver;
use crate::operations::put::PutResolver;
use crate::operations::put_result::PutResult;
use crate::queries::{Query, RawQuery};
use crate::store::SqliteStore;
use crate::StowageResult;

/// Put, get and delete resolvers of `T`.
pub struct TypeMapping<T> {
    put_resolver: Arc<dyn PutResolver<T>>,
    get_resolver: Arc<dyn GetResolver<T>>,
    delete_resolver: Arc<dyn DeleteResolver<T>>,
}

impl<T> TypeMapping<T> {
    pub fn new(
        put_resolver: impl PutResolver<T> + 'static,
        get_resolver: impl GetResolver<T> + 'static,
        delete_resolver: impl DeleteResolver<T> + 'static,
    ) -> Self {
        Self {
            put_resolver: Arc::new(put_resolver),
            get_resolver: Arc::new(get_resolver),
            delete_resolver: Arc::new(delete_resolver),
        }
    }

    pub fn put_resolver(&self) -> &Arc<dyn PutResolver<T>> {
        &self.put_resolver
    }

    pub fn get_resolver(&self) -> &Arc<dyn GetResolver<T>> {
        &self.get_resolver
    }

    pub fn delete_resolver(&self) -> &Arc<dyn DeleteResolver<T>> {
        &self.delete_resolver
    }
}

impl<T: SqliteEntity> TypeMapping<T> {
    /// Mapping derived from the entity's table metadata.
    pub fn for_entity() -> Self {
        Self::new(
            EntityPutResolver::<T>::default(),
            EntityGetResolver::<T>::default(),
            EntityDeleteResolver::<T>::default(),
        )
    }
}

impl<T> Clone for TypeMapping<T> {
    fn clone(&self) -> Self {
        Self {
            put_resolver: Arc::clone(&self.put_resolver),
            get_resolver: Arc::clone(&self.get_resolver),
            delete_resolver: Arc::clone(&self.delete_resolver),
        }
    }
}

impl<T> fmt::Debug for TypeMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeMapping<{}>", type_name::<T>())
    }
}

/// Registry of typed mappings.
#[derive(Debug, Default)]
pub struct TypeMappings {
    finder: TypeMappingFinder,
}

impl TypeMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mapping of `T`, replacing any earlier one.
    pub fn register<T: Send + Sync + 'static>(&self, mapping: TypeMapping<T>) {
        self.finder
            .register(TypeKey::of::<T>(), Arc::new(mapping) as ErasedMapping);
    }

    /// Declares `C` a subtype of `P`.
    ///
    /// Without a mapping of its own, `C` is stored through the mapping of
    /// `P` (or of `P`'s nearest registered ancestor).
    pub fn declare_subtype<C, P>(&self)
    where
        C: AsRef<P> + From<P> + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let adapt: MappingAdapter = Arc::new(|erased: ErasedMapping| {
            let parent = erased.downcast::<TypeMapping<P>>().ok()?;
            Some(Arc::new(upcast::<C, P>(&parent)) as ErasedMapping)
        });
        self.finder
            .declare_parent(TypeKey::of::<C>(), TypeKey::of::<P>(), adapt);
    }

    /// Mapping of `T`, exact or inherited.
    pub fn lookup<T: Send + Sync + 'static>(&self) -> Option<Arc<TypeMapping<T>>> {
        self.finder.find_as::<TypeMapping<T>>(TypeKey::of::<T>())
    }

    pub fn finder(&self) -> &TypeMappingFinder {
        &self.finder
    }
}

fn upcast<C, P>(parent: &TypeMapping<P>) -> TypeMapping<C>
where
    C: AsRef<P> + From<P> + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    TypeMapping::new(
        UpcastPut {
            parent: Arc::clone(&parent.put_resolver),
            _child: PhantomData::<fn() -> C>,
        },
        UpcastGet {
            parent: Arc::clone(&parent.get_resolver),
            _child: PhantomData::<fn() -> C>,
        },
        UpcastDelete {
            parent: Arc::clone(&parent.delete_resolver),
            _child: PhantomData::<fn() -> C>,
        },
    )
}

struct UpcastPut<C, P> {
    parent: Arc<dyn PutResolver<P>>,
    _child: PhantomData<fn() -> C>,
}

impl<C: AsRef<P>, P> PutResolver<C> for UpcastPut<C, P> {
    fn perform_put(&self, store: &SqliteStore, object: &C) -> StowageResult<PutResult> {
        self.parent.perform_put(store, object.as_ref())
    }
}

struct UpcastGet<C, P> {
    parent: Arc<dyn GetResolver<P>>,
    _child: PhantomData<fn() -> C>,
}

impl<C: From<P>, P> GetResolver<C> for UpcastGet<C, P> {
    fn map_from_cursor(&self, store: &SqliteStore, row: &CursorRow<'_>) -> StowageResult<C> {
        self.parent.map_from_cursor(store, row).map(C::from)
    }

    fn perform_get(&self, store: &SqliteStore, query: &Query) -> StowageResult<Cursor> {
        self.parent.perform_get(store, query)
    }

    fn perform_raw_get(&self, store: &SqliteStore, query: &RawQuery) -> StowageResult<Cursor> {
        self.parent.perform_raw_get(store, query)
    }
}

struct UpcastDelete<C, P> {
    parent: Arc<dyn DeleteResolver<P>>,
    _child: PhantomData<fn() -> C>,
}

impl<C: AsRef<P>, P> DeleteResolver<C> for UpcastDelete<C, P> {
    fn perform_delete(&self, store: &SqliteStore, object: &C) -> StowageResult<DeleteResult> {
        self.parent.perform_delete(store, object.as_ref())
    }
}
