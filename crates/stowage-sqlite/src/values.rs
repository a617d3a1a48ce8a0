//! Column values written by insert and update calls.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use stowage_common::StorageClass;

use crate::error::{StowageError, StowageResult};

/// Storage class of a SQLite value.
pub fn storage_class_of(value: &Value) -> StorageClass {
    match value {
        Value::Null => StorageClass::Null,
        Value::Integer(_) => StorageClass::Integer,
        Value::Real(_) => StorageClass::Real,
        Value::Text(_) => StorageClass::Text,
        Value::Blob(_) => StorageClass::Blob,
    }
}

/// Ordered map of column name to value: the native row representation
/// for writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentValues {
    values: BTreeMap<String, Value>,
}

impl ContentValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`, replacing any previous value.
    ///
    /// Accepts anything rusqlite can bind; `Option::None` stores null.
    pub fn put(&mut self, column: impl Into<String>, value: impl ToSql) -> StowageResult<()> {
        let value = match value.to_sql()? {
            ToSqlOutput::Borrowed(borrowed) => Value::from(borrowed),
            ToSqlOutput::Owned(owned) => owned,
            other => {
                return Err(StowageError::InvalidData(format!(
                    "unsupported value for column {}: {other:?}",
                    column.into()
                )))
            }
        };
        self.values.insert(column.into(), value);
        Ok(())
    }

    /// Chained form of [`put`](Self::put) for building values inline.
    pub fn with(mut self, column: impl Into<String>, value: impl ToSql) -> StowageResult<Self> {
        self.put(column, value)?;
        Ok(self)
    }

    /// Sets `column` to a value already in native form.
    pub fn put_value(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn put_null(&mut self, column: impl Into<String>) {
        self.values.insert(column.into(), Value::Null);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Columns and values in column name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for ContentValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ContentValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (column, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{column}=")?;
            match ValueRef::from(value) {
                ValueRef::Null => f.write_str("null")?,
                ValueRef::Integer(v) => write!(f, "{v}")?,
                ValueRef::Real(v) => write!(f, "{v}")?,
                ValueRef::Text(v) => write!(f, "{}", String::from_utf8_lossy(v))?,
                ValueRef::Blob(v) => write!(f, "<{} bytes>", v.len())?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_converts_rust_values() {
        let mut values = ContentValues::new();
        values.put("flag", true).unwrap();
        values.put("count", 7_i16).unwrap();
        values.put("ratio", 0.5_f32).unwrap();
        values.put("name", "ada").unwrap();
        values.put("data", vec![1_u8, 2, 3]).unwrap();
        values.put("missing", None::<i64>).unwrap();

        assert_eq!(values.get("flag"), Some(&Value::Integer(1)));
        assert_eq!(values.get("count"), Some(&Value::Integer(7)));
        assert_eq!(values.get("ratio"), Some(&Value::Real(0.5)));
        assert_eq!(values.get("name"), Some(&Value::Text("ada".into())));
        assert_eq!(values.get("data"), Some(&Value::Blob(vec![1, 2, 3])));
        assert_eq!(values.get("missing"), Some(&Value::Null));
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn iteration_is_ordered_by_column() {
        let values = ContentValues::new()
            .with("b", 2)
            .unwrap()
            .with("a", 1)
            .unwrap();
        let columns: Vec<&str> = values.columns().collect();
        assert_eq!(columns, vec!["a", "b"]);
    }

    #[test]
    fn display_lists_values() {
        let values = ContentValues::new()
            .with("id", 1)
            .unwrap()
            .with("name", "x")
            .unwrap()
            .with("blob", vec![0_u8; 4])
            .unwrap();
        assert_eq!(values.to_string(), "{blob=<4 bytes>, id=1, name=x}");
    }

    #[test]
    fn storage_classes() {
        assert_eq!(storage_class_of(&Value::Null), StorageClass::Null);
        assert_eq!(storage_class_of(&Value::Integer(1)), StorageClass::Integer);
        assert_eq!(storage_class_of(&Value::Real(1.0)), StorageClass::Real);
        assert_eq!(storage_class_of(&Value::Text("x".into())), StorageClass::Text);
        assert_eq!(storage_class_of(&Value::Blob(vec![])), StorageClass::Blob);
    }
}
