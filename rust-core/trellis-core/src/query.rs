//! # Query Builder
//!
//! Builds SELECT / INSERT / UPDATE / DELETE text with `?` placeholders and
//! the matching parameter list.
//!
//! Names (tables, columns, ORDER BY) are validated and quoted through
//! [`crate::ident`]. WHERE and join ON predicates are taken **as written**:
//! the builder binds the values passed alongside them but never inspects the
//! predicate text. Callers own predicate safety; never splice user input
//! into a predicate, pass it as a parameter instead.

use crate::error::{Error, Result};
use crate::ident::{quote_column_list, quote_identifier, OrderSpec};
use crate::value::{SqlValue, TypeTag};
use std::fmt::Write as _;

/// SQL text plus its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    sql: String,
    params: Vec<SqlValue>,
}

impl BoundQuery {
    /// Wrap hand-written SQL and its parameters
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Statement text
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in placeholder order
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Binding tag of each parameter, in placeholder order
    #[must_use]
    pub fn type_tags(&self) -> Vec<TypeTag> {
        self.params.iter().map(SqlValue::type_tag).collect()
    }

    /// Split into text and parameters
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

/// Join flavours accepted in a SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// `INNER JOIN`
    #[default]
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `LEFT OUTER JOIN`
    LeftOuter,
    /// `RIGHT OUTER JOIN`
    RightOuter,
}

impl JoinKind {
    /// Parse a join keyword, case-insensitively.
    ///
    /// Anything outside the five known forms becomes `INNER`.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            "LEFT OUTER" => Self::LeftOuter,
            "RIGHT OUTER" => Self::RightOuter,
            _ => Self::Inner,
        }
    }

    /// Keyword as written in SQL (without `JOIN`)
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::LeftOuter => "LEFT OUTER",
            Self::RightOuter => "RIGHT OUTER",
        }
    }
}

/// A validated join clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join flavour
    pub kind: JoinKind,
    /// Quoted target table (with optional alias)
    pub table: String,
    /// Raw ON predicate
    pub on: String,
}

impl JoinSpec {
    /// Validate a join.
    ///
    /// # Errors
    ///
    /// `Error::InvalidJoinSpec` when the table or the predicate is blank,
    /// `Error::InvalidIdentifier` when the table name fails the allow-list.
    pub fn new(kind: &str, table: &str, on: &str) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(Error::InvalidJoinSpec {
                reason: "join is missing its table".to_string(),
            });
        }
        if on.trim().is_empty() {
            return Err(Error::InvalidJoinSpec {
                reason: format!("join on {} is missing its ON predicate", table.trim()),
            });
        }
        Ok(Self {
            kind: JoinKind::parse_lossy(kind),
            table: quote_identifier(table)?,
            on: on.trim().to_string(),
        })
    }

    fn to_sql(&self) -> String {
        format!("{} JOIN {} ON {}", self.kind.as_sql(), self.table, self.on)
    }
}

/// SELECT builder
///
/// Validation is deferred to [`SelectQuery::build`], so the builder can be
/// kept around and reused.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: String,
    joins: Vec<(String, String, String)>,
    filter: Option<(String, Vec<SqlValue>)>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

/// Start a SELECT from `table`
#[must_use]
pub fn select(table: &str) -> SelectQuery {
    SelectQuery {
        table: table.to_string(),
        columns: "*".to_string(),
        joins: Vec::new(),
        filter: None,
        order_by: None,
        limit: None,
        offset: None,
    }
}

impl SelectQuery {
    /// Column list, e.g. `"id, u.name AS author, COUNT(*) AS n"`
    #[must_use]
    pub fn columns(mut self, spec: &str) -> Self {
        self.columns = spec.to_string();
        self
    }

    /// Add a join. `kind` outside the known forms becomes `INNER`.
    #[must_use]
    pub fn join(mut self, kind: &str, table: &str, on: &str) -> Self {
        self.joins
            .push((kind.to_string(), table.to_string(), on.to_string()));
        self
    }

    /// Raw WHERE predicate and the values for its placeholders
    #[must_use]
    pub fn filter(mut self, predicate: &str, params: Vec<SqlValue>) -> Self {
        self.filter = Some((predicate.to_string(), params));
        self
    }

    /// ORDER BY list, e.g. `"created_at DESC, id"`
    #[must_use]
    pub fn order_by(mut self, spec: &str) -> Self {
        self.order_by = Some(spec.to_string());
        self
    }

    /// Maximum number of rows
    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Rows to skip; only emitted together with a limit
    #[must_use]
    pub const fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Assemble the statement
    ///
    /// # Errors
    ///
    /// Identifier and join validation errors. `InvalidArgument` when
    /// filter values are given without a predicate to bind them to.
    pub fn build(&self) -> Result<BoundQuery> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            quote_column_list(&self.columns)?,
            quote_identifier(&self.table)?
        );

        for (kind, table, on) in &self.joins {
            let join = JoinSpec::new(kind, table, on)?;
            let _ = write!(sql, " {}", join.to_sql());
        }

        let mut params = Vec::new();
        if let Some((predicate, values)) = &self.filter {
            if !predicate.trim().is_empty() {
                let _ = write!(sql, " WHERE {}", predicate.trim());
                params.extend(values.iter().cloned());
            } else if !values.is_empty() {
                return Err(Error::invalid_argument(
                    "filter values given without a predicate",
                ));
            }
        }

        if let Some(spec) = &self.order_by {
            let order = OrderSpec::parse(spec)?;
            if !order.is_empty() {
                let _ = write!(sql, " ORDER BY {}", order.to_sql());
            }
        }

        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
            if let Some(offset) = self.offset {
                let _ = write!(sql, " OFFSET {offset}");
            }
        }

        Ok(BoundQuery { sql, params })
    }
}

/// Collect `(column, value)` pairs, quoting the columns
fn quoted_pairs<I, K, V>(values: I) -> Result<(Vec<String>, Vec<SqlValue>)>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<SqlValue>,
{
    let mut columns = Vec::new();
    let mut params = Vec::new();
    for (column, value) in values {
        columns.push(quote_identifier(column.as_ref())?);
        params.push(value.into());
    }
    Ok((columns, params))
}

fn require_predicate(statement: &str, predicate: &str) -> Result<()> {
    if predicate.trim().is_empty() {
        return Err(Error::invalid_argument(format!(
            "{statement} requires a WHERE predicate"
        )));
    }
    Ok(())
}

/// INSERT one row; columns follow the order of `values`
///
/// # Errors
///
/// `Error::InvalidArgument` when `values` is empty, identifier errors for
/// bad table or column names.
pub fn insert<I, K, V>(table: &str, values: I) -> Result<BoundQuery>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<SqlValue>,
{
    let table = quote_identifier(table)?;
    let (columns, params) = quoted_pairs(values)?;
    if columns.is_empty() {
        return Err(Error::invalid_argument("INSERT requires at least one value"));
    }

    let placeholders = vec!["?"; params.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    Ok(BoundQuery { sql, params })
}

/// UPDATE rows matching a raw predicate.
///
/// SET parameters come first, then `where_params`.
///
/// # Errors
///
/// `Error::InvalidArgument` when `values` is empty or the predicate is blank,
/// identifier errors for bad table or column names.
pub fn update<I, K, V>(
    table: &str,
    values: I,
    predicate: &str,
    where_params: Vec<SqlValue>,
) -> Result<BoundQuery>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<SqlValue>,
{
    let table = quote_identifier(table)?;
    let (columns, mut params) = quoted_pairs(values)?;
    if columns.is_empty() {
        return Err(Error::invalid_argument("UPDATE requires at least one value"));
    }
    require_predicate("UPDATE", predicate)?;

    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
    params.extend(where_params);
    let sql = format!(
        "UPDATE {table} SET {} WHERE {}",
        assignments.join(", "),
        predicate.trim()
    );
    Ok(BoundQuery { sql, params })
}

/// DELETE rows matching a raw predicate
///
/// # Errors
///
/// `Error::InvalidArgument` when the predicate is blank, identifier errors
/// for a bad table name.
pub fn delete(table: &str, predicate: &str, params: Vec<SqlValue>) -> Result<BoundQuery> {
    let table = quote_identifier(table)?;
    require_predicate("DELETE", predicate)?;
    Ok(BoundQuery {
        sql: format!("DELETE FROM {table} WHERE {}", predicate.trim()),
        params,
    })
}
