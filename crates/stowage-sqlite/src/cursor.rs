//! Materialized query results.
//!
//! A `Cursor` owns every row of a result set. The statement that produced
//! it is finalized before the cursor is handed out, so nothing stays open
//! on either the success or the error path.

use std::sync::Arc;

use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Params, Statement};

use crate::error::{StowageError, StowageResult};

/// Rows returned by a query, in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl Cursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    /// Runs a prepared statement to completion and collects its rows.
    pub(crate) fn query<P: Params>(statement: &mut Statement<'_>, params: P) -> StowageResult<Self> {
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();
        let rows = statement
            .query_map(params, |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of `name` among the result columns.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, index: usize) -> Option<CursorRow<'_>> {
        self.rows.get(index).map(|values| CursorRow {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<CursorRow<'_>> {
        self.row(0)
    }

    pub fn last(&self) -> Option<CursorRow<'_>> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    pub fn rows(&self) -> impl Iterator<Item = CursorRow<'_>> {
        self.rows.iter().map(|values| CursorRow {
            columns: &self.columns,
            values,
        })
    }
}

/// One row of a [`Cursor`].
#[derive(Debug, Clone, Copy)]
pub struct CursorRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> CursorRow<'a> {
    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    /// Raw value of the named column.
    pub fn value(&self, column: &str) -> StowageResult<&'a Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StowageError::InvalidData(format!("no column {column} in result")))?;
        self.values
            .get(index)
            .ok_or_else(|| StowageError::InvalidData(format!("row has no value for column {column}")))
    }

    /// Converts the named column to `T`.
    ///
    /// Use `Option<T>` for nullable columns.
    pub fn get<T: FromSql>(&self, column: &str) -> StowageResult<T> {
        let value = self.value(column)?;
        T::column_result(ValueRef::from(value)).map_err(|e| {
            StowageError::InvalidData(format!("column {column}: {e}"))
        })
    }

    /// Converts the column at `index` to `T`.
    pub fn get_at<T: FromSql>(&self, index: usize) -> StowageResult<T> {
        let value = self.values.get(index).ok_or_else(|| {
            StowageError::InvalidData(format!("column index {index} out of range"))
        })?;
        T::column_result(ValueRef::from(value))
            .map_err(|e| StowageError::InvalidData(format!("column {index}: {e}")))
    }
}
