//! Query descriptions passed to the low-level store.
//!
//! Each query is built in two stages: the first call supplies the required
//! target (a table or SQL text) and returns a complete builder whose
//! optional setters can be chained in any order. `build()` validates the
//! target. Where-arg counts are not checked against placeholders.

use std::collections::BTreeSet;
use std::fmt;

use rusqlite::types::Value;
use stowage_common::{ValidationError, ValidationResult};

fn collect_names<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

fn collect_args<I, V>(args: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    args.into_iter().map(Into::into).collect()
}

fn check_table(table: &str) -> ValidationResult<()> {
    if table.is_empty() {
        Err(ValidationError::EmptyTable)
    } else {
        Ok(())
    }
}

/// Structured `SELECT` against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    distinct: bool,
    table: String,
    columns: Vec<String>,
    where_clause: Option<String>,
    where_args: Vec<Value>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<String>,
    observes_tags: BTreeSet<String>,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder
    }

    pub fn distinct(&self) -> bool {
        self.distinct
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Selected columns; empty selects all.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn where_args(&self) -> &[Value] {
        &self.where_args
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn having(&self) -> Option<&str> {
        self.having.as_deref()
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn limit(&self) -> Option<&str> {
        self.limit.as_deref()
    }

    /// Tags a live query over this query re-runs on, besides its table.
    pub fn observes_tags(&self) -> &BTreeSet<String> {
        &self.observes_tags
    }

    /// The `SELECT` statement this query runs.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        let clauses = [
            (" WHERE ", &self.where_clause),
            (" GROUP BY ", &self.group_by),
            (" HAVING ", &self.having),
            (" ORDER BY ", &self.order_by),
            (" LIMIT ", &self.limit),
        ];
        for (keyword, clause) in clauses {
            if let Some(clause) = clause.as_deref().filter(|c| !c.is_empty()) {
                sql.push_str(keyword);
                sql.push_str(clause);
            }
        }
        sql
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query {{ sql = {}, args = {:?} }}", self.to_sql(), self.where_args)
    }
}

/// First stage of [`Query`] construction.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn table(self, table: impl Into<String>) -> QueryCompleteBuilder {
        QueryCompleteBuilder {
            query: Query {
                distinct: false,
                table: table.into(),
                columns: Vec::new(),
                where_clause: None,
                where_args: Vec::new(),
                group_by: None,
                having: None,
                order_by: None,
                limit: None,
                observes_tags: BTreeSet::new(),
            },
        }
    }
}

/// Optional parts of a [`Query`].
#[derive(Debug, Clone)]
pub struct QueryCompleteBuilder {
    query: Query,
}

impl QueryCompleteBuilder {
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query.distinct = distinct;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.query.where_clause = Some(clause.into());
        self
    }

    pub fn where_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.where_args = collect_args(args);
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.query.group_by = Some(group_by.into());
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.query.having = Some(having.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.query.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, quantity: u64) -> Self {
        self.query.limit = Some(quantity.to_string());
        self
    }

    /// `LIMIT offset, quantity`.
    pub fn limit_offset(mut self, offset: u64, quantity: u64) -> Self {
        self.query.limit = Some(format!("{offset}, {quantity}"));
        self
    }

    pub fn observes_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.observes_tags = collect_names(tags);
        self
    }

    pub fn build(self) -> ValidationResult<Query> {
        check_table(&self.query.table)?;
        Ok(self.query)
    }
}

/// Arbitrary SQL with declared side effects.
///
/// `affects_*` name what a write through this query changes (notified after
/// it runs); `observes_*` name what a live read over it re-runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    sql: String,
    args: Vec<Value>,
    affects_tables: BTreeSet<String>,
    affects_tags: BTreeSet<String>,
    observes_tables: BTreeSet<String>,
    observes_tags: BTreeSet<String>,
}

impl RawQuery {
    pub fn builder() -> RawQueryBuilder {
        RawQueryBuilder
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn affects_tables(&self) -> &BTreeSet<String> {
        &self.affects_tables
    }

    pub fn affects_tags(&self) -> &BTreeSet<String> {
        &self.affects_tags
    }

    pub fn observes_tables(&self) -> &BTreeSet<String> {
        &self.observes_tables
    }

    pub fn observes_tags(&self) -> &BTreeSet<String> {
        &self.observes_tags
    }
}

impl fmt::Display for RawQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawQuery {{ sql = {}, args = {:?}, affects_tables = {:?}, affects_tags = {:?} }}",
            self.sql, self.args, self.affects_tables, self.affects_tags
        )
    }
}

/// First stage of [`RawQuery`] construction.
#[derive(Debug, Clone, Copy)]
pub struct RawQueryBuilder;

impl RawQueryBuilder {
    pub fn query(self, sql: impl Into<String>) -> RawQueryCompleteBuilder {
        RawQueryCompleteBuilder {
            query: RawQuery {
                sql: sql.into(),
                args: Vec::new(),
                affects_tables: BTreeSet::new(),
                affects_tags: BTreeSet::new(),
                observes_tables: BTreeSet::new(),
                observes_tags: BTreeSet::new(),
            },
        }
    }
}

/// Optional parts of a [`RawQuery`].
#[derive(Debug, Clone)]
pub struct RawQueryCompleteBuilder {
    query: RawQuery,
}

impl RawQueryCompleteBuilder {
    pub fn args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.args = collect_args(args);
        self
    }

    pub fn affects_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.affects_tables = collect_names(tables);
        self
    }

    pub fn affects_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.affects_tags = collect_names(tags);
        self
    }

    pub fn observes_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.observes_tables = collect_names(tables);
        self
    }

    pub fn observes_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.observes_tags = collect_names(tags);
        self
    }

    pub fn build(self) -> ValidationResult<RawQuery> {
        if self.query.sql.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(self.query)
    }
}

/// Target of an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertQuery {
    table: String,
    null_column_hack: Option<String>,
    affects_tags: BTreeSet<String>,
}

impl InsertQuery {
    pub fn builder() -> InsertQueryBuilder {
        InsertQueryBuilder
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column set to null when the insert carries no values.
    pub fn null_column_hack(&self) -> Option<&str> {
        self.null_column_hack.as_deref()
    }

    pub fn affects_tags(&self) -> &BTreeSet<String> {
        &self.affects_tags
    }
}

/// First stage of [`InsertQuery`] construction.
#[derive(Debug, Clone, Copy)]
pub struct InsertQueryBuilder;

impl InsertQueryBuilder {
    pub fn table(self, table: impl Into<String>) -> InsertQueryCompleteBuilder {
        InsertQueryCompleteBuilder {
            query: InsertQuery {
                table: table.into(),
                null_column_hack: None,
                affects_tags: BTreeSet::new(),
            },
        }
    }
}

/// Optional parts of an [`InsertQuery`].
#[derive(Debug, Clone)]
pub struct InsertQueryCompleteBuilder {
    query: InsertQuery,
}

impl InsertQueryCompleteBuilder {
    pub fn null_column_hack(mut self, column: impl Into<String>) -> Self {
        self.query.null_column_hack = Some(column.into());
        self
    }

    pub fn affects_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.affects_tags = collect_names(tags);
        self
    }

    pub fn build(self) -> ValidationResult<InsertQuery> {
        check_table(&self.query.table)?;
        Ok(self.query)
    }
}

/// Target and predicate of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    table: String,
    where_clause: Option<String>,
    where_args: Vec<Value>,
    affects_tags: BTreeSet<String>,
}

impl UpdateQuery {
    pub fn builder() -> UpdateQueryBuilder {
        UpdateQueryBuilder
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn where_args(&self) -> &[Value] {
        &self.where_args
    }

    pub fn affects_tags(&self) -> &BTreeSet<String> {
        &self.affects_tags
    }
}

/// First stage of [`UpdateQuery`] construction.
#[derive(Debug, Clone, Copy)]
pub struct UpdateQueryBuilder;

impl UpdateQueryBuilder {
    pub fn table(self, table: impl Into<String>) -> UpdateQueryCompleteBuilder {
        UpdateQueryCompleteBuilder {
            query: UpdateQuery {
                table: table.into(),
                where_clause: None,
                where_args: Vec::new(),
                affects_tags: BTreeSet::new(),
            },
        }
    }
}

/// Optional parts of an [`UpdateQuery`].
#[derive(Debug, Clone)]
pub struct UpdateQueryCompleteBuilder {
    query: UpdateQuery,
}

impl UpdateQueryCompleteBuilder {
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.query.where_clause = Some(clause.into());
        self
    }

    pub fn where_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.where_args = collect_args(args);
        self
    }

    pub fn affects_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.affects_tags = collect_names(tags);
        self
    }

    pub fn build(self) -> ValidationResult<UpdateQuery> {
        check_table(&self.query.table)?;
        Ok(self.query)
    }
}

/// Target and predicate of a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    table: String,
    where_clause: Option<String>,
    where_args: Vec<Value>,
    affects_tags: BTreeSet<String>,
}

impl DeleteQuery {
    pub fn builder() -> DeleteQueryBuilder {
        DeleteQueryBuilder
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn where_args(&self) -> &[Value] {
        &self.where_args
    }

    pub fn affects_tags(&self) -> &BTreeSet<String> {
        &self.affects_tags
    }
}

impl fmt::Display for DeleteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeleteQuery {{ table = {}, where = {:?}, args = {:?} }}",
            self.table, self.where_clause, self.where_args
        )
    }
}

/// First stage of [`DeleteQuery`] construction.
#[derive(Debug, Clone, Copy)]
pub struct DeleteQueryBuilder;

impl DeleteQueryBuilder {
    pub fn table(self, table: impl Into<String>) -> DeleteQueryCompleteBuilder {
        DeleteQueryCompleteBuilder {
            query: DeleteQuery {
                table: table.into(),
                where_clause: None,
                where_args: Vec::new(),
                affects_tags: BTreeSet::new(),
            },
        }
    }
}

/// Optional parts of a [`DeleteQuery`].
#[derive(Debug, Clone)]
pub struct DeleteQueryCompleteBuilder {
    query: DeleteQuery,
}

impl DeleteQueryCompleteBuilder {
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.query.where_clause = Some(clause.into());
        self
    }

    pub fn where_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.where_args = collect_args(args);
        self
    }

    pub fn affects_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.affects_tags = collect_names(tags);
        self
    }

    pub fn build(self) -> ValidationResult<DeleteQuery> {
        check_table(&self.query.table)?;
        Ok(self.query)
    }
}
