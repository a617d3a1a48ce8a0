//! Types that describe their own table.
//!
//! A type implementing [`SqliteEntity`] gets put, get and delete resolvers
//! for free: keys come from its `TableMeta`, values from
//! `to_content_values` and objects from `from_row`.

use std::fmt;
use std::marker::PhantomData;

use rusqlite::types::Value;
use stowage_common::TableMeta;

use crate::cursor::CursorRow;
use crate::operations::delete::{DefaultDeleteResolver, DeleteMapper};
use crate::operations::get::GetResolver;
use crate::operations::put::{DefaultPutResolver, PutMapper};
use crate::queries::{DeleteQuery, InsertQuery, UpdateQuery};
use crate::store::SqliteStore;
use crate::values::{storage_class_of, ContentValues};
use crate::StowageResult;

/// A persistable type mapped onto one table.
pub trait SqliteEntity: Sized + Send + Sync + 'static {
    /// Table and columns this type is stored in.
    fn table_meta() -> &'static TableMeta;

    /// Every column value of `self`, keys included.
    ///
    /// A key that has not been assigned yet is null.
    fn to_content_values(&self) -> StowageResult<ContentValues>;

    /// Builds an object from one result row.
    fn from_row(row: &CursorRow<'_>) -> StowageResult<Self>;
}

/// Put and delete mapping derived from [`SqliteEntity`].
pub struct EntityMapper<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> EntityMapper<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T> Default for EntityMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EntityMapper<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EntityMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityMapper<{}>", std::any::type_name::<T>())
    }
}

impl<T: SqliteEntity> EntityMapper<T> {
    /// Key values of `object` in key column order.
    fn key_args(values: &ContentValues) -> Vec<Value> {
        T::table_meta()
            .key_columns()
            .map(|c| values.get(c.name()).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Values checked against the table, with ignorable nulls dropped.
    fn checked_values(object: &T) -> StowageResult<ContentValues> {
        let meta = T::table_meta();
        let mut values = object.to_content_values()?;
        for column in meta.columns() {
            if column.is_ignore_null() && values.get(column.name()) == Some(&Value::Null) {
                values.remove(column.name());
            }
        }
        for (column, value) in values.iter() {
            meta.check_value(column, storage_class_of(value))?;
        }
        Ok(values)
    }
}

impl<T: SqliteEntity> PutMapper<T> for EntityMapper<T> {
    fn map_to_insert_query(&self, _object: &T) -> StowageResult<InsertQuery> {
        Ok(InsertQuery::builder()
            .table(T::table_meta().table())
            .build()?)
    }

    fn map_to_update_query(&self, object: &T) -> StowageResult<UpdateQuery> {
        let meta = T::table_meta();
        let values = object.to_content_values()?;
        Ok(UpdateQuery::builder()
            .table(meta.table())
            .where_clause(meta.key_predicate())
            .where_args(Self::key_args(&values))
            .build()?)
    }

    fn map_to_content_values(&self, object: &T) -> StowageResult<ContentValues> {
        Self::checked_values(object)
    }
}

impl<T: SqliteEntity> DeleteMapper<T> for EntityMapper<T> {
    fn map_to_delete_query(&self, object: &T) -> StowageResult<DeleteQuery> {
        let meta = T::table_meta();
        let values = object.to_content_values()?;
        Ok(DeleteQuery::builder()
            .table(meta.table())
            .where_clause(meta.key_predicate())
            .where_args(Self::key_args(&values))
            .build()?)
    }
}

/// Put resolver for any [`SqliteEntity`].
pub type EntityPutResolver<T> = DefaultPutResolver<EntityMapper<T>>;

/// Delete resolver for any [`SqliteEntity`].
pub type EntityDeleteResolver<T> = DefaultDeleteResolver<EntityMapper<T>>;

/// Get resolver for any [`SqliteEntity`].
pub struct EntityGetResolver<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> EntityGetResolver<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T> Default for EntityGetResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SqliteEntity> GetResolver<T> for EntityGetResolver<T> {
    fn map_from_cursor(&self, _store: &SqliteStore, row: &CursorRow<'_>) -> StowageResult<T> {
        T::from_row(row)
    }
}
