//! Column and table metadata.
//!
//! A `TableMeta` describes how a persistable type maps onto one table: the
//! table name plus one `ColumnMeta` per stored field. Resolvers derive their
//! key predicates and value filtering from it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Source type of a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    ByteArray,
}

/// SQLite storage class of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    /// Declared type used when creating the column.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Boolean | ColumnType::Short | ColumnType::Int | ColumnType::Long => {
                "INTEGER"
            }
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::String => "TEXT",
            ColumnType::ByteArray => "BLOB",
        }
    }

    /// Whether a value of `class` can be stored in a column of this type.
    ///
    /// Null is accepted here; nullability is checked by `ColumnMeta`.
    /// Real columns take integers too, SQLite converts them on write.
    pub fn accepts(self, class: StorageClass) -> bool {
        match (self, class) {
            (_, StorageClass::Null) => true,
            (
                ColumnType::Boolean | ColumnType::Short | ColumnType::Int | ColumnType::Long,
                StorageClass::Integer,
            ) => true,
            (ColumnType::Float | ColumnType::Double, StorageClass::Real | StorageClass::Integer) => {
                true
            }
            (ColumnType::String, StorageClass::Text) => true,
            (ColumnType::ByteArray, StorageClass::Blob) => true,
            _ => false,
        }
    }
}

/// Metadata for one stored field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    key: bool,
    ignore_null: bool,
}

impl ColumnMeta {
    /// A non-nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            key: false,
            ignore_null: false,
        }
    }

    /// Marks the column as (part of) the key.
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Marks the column as nullable (the boxed form of its type).
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Skips the column when its value is null, so an update keeps the
    /// stored value instead of overwriting it with null.
    pub fn ignore_null(mut self) -> Self {
        self.ignore_null = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn is_ignore_null(&self) -> bool {
        self.ignore_null
    }

    /// Checks a value of `class` against this column.
    pub fn check(&self, class: StorageClass) -> ValidationResult<()> {
        if class == StorageClass::Null {
            if self.nullable {
                return Ok(());
            }
            return Err(ValidationError::NullInNonNullable {
                column: self.name.clone(),
            });
        }
        if self.column_type.accepts(class) {
            Ok(())
        } else {
            Err(ValidationError::TypeMismatch {
                column: self.name.clone(),
                expected: self.column_type,
                actual: class,
            })
        }
    }

    fn definition(&self, inline_key: bool) -> String {
        let mut definition = format!("{} {}", self.name, self.column_type.sql_type());
        if inline_key {
            definition.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            definition.push_str(" NOT NULL");
        }
        definition
    }
}

/// Metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    table: String,
    columns: Vec<ColumnMeta>,
}

impl TableMeta {
    /// Validates and builds table metadata.
    ///
    /// Fails when the table or a column name is empty, a column name is
    /// repeated, no key column exists, or a non-nullable column asks to
    /// ignore nulls.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnMeta>) -> ValidationResult<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(ValidationError::EmptyTable);
        }
        if columns.is_empty() {
            return Err(ValidationError::NoColumns { table });
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.name.is_empty() {
                return Err(ValidationError::EmptyColumnName { table });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ValidationError::DuplicateColumn {
                    table,
                    column: column.name.clone(),
                });
            }
            if column.ignore_null && !column.nullable {
                return Err(ValidationError::IgnoreNullOnPrimitive {
                    column: column.name.clone(),
                });
            }
        }
        if !columns.iter().any(ColumnMeta::is_key) {
            return Err(ValidationError::MissingKey { table });
        }

        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Looks a column up by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Key columns in declaration order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| c.key)
    }

    /// `k1 = ? AND k2 = ?` over the key columns.
    pub fn key_predicate(&self) -> String {
        self.key_columns()
            .map(|c| format!("{} = ?", c.name))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Checks one value against the named column.
    pub fn check_value(&self, column: &str, class: StorageClass) -> ValidationResult<()> {
        match self.column(column) {
            Some(meta) => meta.check(class),
            None => Err(ValidationError::UnknownColumn {
                table: self.table.clone(),
                column: column.to_string(),
            }),
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    ///
    /// A single key column is declared inline, so a nullable `Long` key
    /// becomes an `INTEGER PRIMARY KEY` rowid alias.
    pub fn create_table_sql(&self) -> String {
        let keys: Vec<&str> = self.key_columns().map(ColumnMeta::name).collect();
        let single_key = keys.len() == 1;

        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.definition(single_key && c.key))
            .collect();
        if !single_key {
            definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            definitions.join(", ")
        )
    }
}
