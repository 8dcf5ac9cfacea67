//! # Database Module
//!
//! Statement execution against one shared SQLite connection.
//!
//! A [`Database`] owns a single lazily-opened connection; every statement
//! runs serially on it, there is no pool. Build one from a
//! [`DatabaseConfig`] at startup and hand it to handlers as an
//! `Arc<Database>`.
//!
//! Statements come from [`crate::query`]. A statement without parameters is
//! sent as-is; one with parameters is prepared, bound by each value's
//! [`TypeTag`](crate::value::TypeTag) and executed. Driver failures surface
//! as `ConnectionFailed`, `PrepareFailed` or `ExecuteFailed` and are never
//! retried here.

use crate::error::{Error, Result};
use crate::middleware::BoxFuture;
use crate::query::{self, BoundQuery, SelectQuery};
use crate::value::SqlValue;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteQueryResult, SqliteRow,
};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// How statements are scheduled on the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run each statement straight away
    #[default]
    Direct,
    /// Yield to the scheduler before each statement so other tasks can run.
    /// Results are identical to `Direct`.
    Cooperative,
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite::memory:` or `sqlite://app.db`
    pub url: String,
    /// Statement scheduling
    pub mode: ExecutionMode,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            mode: ExecutionMode::Direct,
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    /// Config for `url` with default settings
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the execution mode
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set whether a missing database file is created
    #[must_use]
    pub const fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// A column value read back from SQLite
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    Null,
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// Text value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl DbValue {
    /// Integer content, if any
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One result row, columns in driver order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbRow {
    columns: Vec<(String, DbValue)>,
}

impl DbRow {
    /// Value of the first column called `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Iterate `(column, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Column count
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for DbRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

enum Slot {
    Pending,
    Open(SqliteConnection),
    Closed,
}

/// The shared connection and the operations that run on it
pub struct Database {
    config: DatabaseConfig,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Create a handle; the connection opens on first use
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(Slot::Pending),
        }
    }

    /// Create a handle and open the connection now
    ///
    /// # Errors
    ///
    /// `Error::ConnectionFailed` if SQLite refuses the URL or the file.
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        let db = Self::new(config);
        drop(db.acquire().await?);
        Ok(db)
    }

    /// Settings this handle was built with
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn acquire(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>> {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Open(open(&self.config).await?);
        }
        MutexGuard::try_map(slot, |slot| match slot {
            Slot::Open(conn) => Some(conn),
            Slot::Pending | Slot::Closed => None,
        })
        .map_err(|_| Error::ConnectionFailed {
            message: "connection has been closed".to_string(),
            code: None,
        })
    }

    /// Run a statement that returns rows
    ///
    /// # Errors
    ///
    /// Connection, prepare and execute failures.
    pub async fn run_query(&self, query: &BoundQuery) -> Result<Vec<DbRow>> {
        let mut conn = self.acquire().await?;
        run_query(&mut conn, query, self.config.mode).await
    }

    /// Run a statement and return the number of affected rows
    ///
    /// # Errors
    ///
    /// Connection, prepare and execute failures.
    pub async fn run_execute(&self, query: &BoundQuery) -> Result<u64> {
        let mut conn = self.acquire().await?;
        Ok(run_statement(&mut conn, query, self.config.mode)
            .await?
            .rows_affected())
    }

    /// Run an INSERT and return the new row id
    ///
    /// # Errors
    ///
    /// Connection, prepare and execute failures.
    pub async fn run_insert(&self, query: &BoundQuery) -> Result<i64> {
        let mut conn = self.acquire().await?;
        Ok(run_statement(&mut conn, query, self.config.mode)
            .await?
            .last_insert_rowid())
    }

    /// Build and run a SELECT
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn read_records(&self, select: &SelectQuery) -> Result<Vec<DbRow>> {
        self.run_query(&select.build()?).await
    }

    /// First row of a SELECT; the query is limited to one row
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn read_one(&self, select: &SelectQuery) -> Result<Option<DbRow>> {
        let query = select.clone().limit(1).build()?;
        Ok(self.run_query(&query).await?.into_iter().next())
    }

    /// INSERT one row and return its id
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty value set, identifier errors, then
    /// driver errors.
    pub async fn write_record<I, K, V>(&self, table: &str, values: I) -> Result<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        let query = query::insert(table, values)?;
        self.run_insert(&query).await
    }

    /// UPDATE matching rows and return how many changed
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn update_records<I, K, V>(
        &self,
        table: &str,
        values: I,
        predicate: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        let query = query::update(table, values, predicate, params)?;
        self.run_execute(&query).await
    }

    /// DELETE matching rows and return how many went
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn delete_records(
        &self,
        table: &str,
        predicate: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64> {
        let query = query::delete(table, predicate, params)?;
        self.run_execute(&query).await
    }

    /// Run `work` inside `BEGIN` / `COMMIT`.
    ///
    /// If `work` fails the transaction is rolled back and the error from
    /// `work` is returned unchanged. The connection stays locked for the
    /// whole bracket. If the returned future is dropped before it
    /// finishes, the open transaction is rolled back before the connection
    /// runs anything else.
    ///
    /// ```ignore
    /// db.transaction(|tx| Box::pin(async move {
    ///     let id = tx.write_record("orders", [("total", 10_i64)]).await?;
    ///     tx.write_record("order_lines", [("order_id", id)]).await
    /// }))
    /// .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Errors from `work`, or driver errors from `BEGIN` / `COMMIT`.
    pub async fn transaction<F, T>(&self, work: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let mut conn = self.acquire().await?;
        let mode = self.config.mode;
        // Dropping `bracket` before commit queues a ROLLBACK on the
        // connection, so a cancelled caller cannot leave BEGIN open.
        let mut bracket = Connection::begin(&mut *conn)
            .await
            .map_err(|e| Error::execute(&e))?;
        debug!("Transaction started");

        let outcome = {
            let mut tx = Transaction {
                conn: &mut *bracket,
                mode,
            };
            work(&mut tx).await
        };

        match outcome {
            Ok(value) => {
                bracket.commit().await.map_err(|e| {
                    warn!(error = %e, "Commit failed, rolling back");
                    Error::execute(&e)
                })?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                match bracket.rollback().await {
                    Ok(()) => debug!("Transaction rolled back"),
                    Err(rollback_err) => warn!(error = %rollback_err, "Rollback failed"),
                }
                Err(err)
            }
        }
    }

    /// Close the shared connection. Later calls fail with
    /// `ConnectionFailed`; the connection is not reopened.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionFailed` if SQLite reports an error while closing.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Open(conn) => {
                conn.close().await.map_err(|e| Error::connection(&e))?;
                info!("Database connection closed");
                Ok(())
            }
            Slot::Pending | Slot::Closed => Ok(()),
        }
    }
}

/// Handle given to [`Database::transaction`] work
pub struct Transaction<'t> {
    conn: &'t mut SqliteConnection,
    mode: ExecutionMode,
}

impl Transaction<'_> {
    /// See [`Database::run_query`]
    ///
    /// # Errors
    ///
    /// Prepare and execute failures.
    pub async fn run_query(&mut self, query: &BoundQuery) -> Result<Vec<DbRow>> {
        run_query(self.conn, query, self.mode).await
    }

    /// See [`Database::run_execute`]
    ///
    /// # Errors
    ///
    /// Prepare and execute failures.
    pub async fn run_execute(&mut self, query: &BoundQuery) -> Result<u64> {
        Ok(run_statement(self.conn, query, self.mode)
            .await?
            .rows_affected())
    }

    /// See [`Database::run_insert`]
    ///
    /// # Errors
    ///
    /// Prepare and execute failures.
    pub async fn run_insert(&mut self, query: &BoundQuery) -> Result<i64> {
        Ok(run_statement(self.conn, query, self.mode)
            .await?
            .last_insert_rowid())
    }

    /// See [`Database::read_records`]
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn read_records(&mut self, select: &SelectQuery) -> Result<Vec<DbRow>> {
        let query = select.build()?;
        self.run_query(&query).await
    }

    /// See [`Database::read_one`]
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn read_one(&mut self, select: &SelectQuery) -> Result<Option<DbRow>> {
        let query = select.clone().limit(1).build()?;
        Ok(self.run_query(&query).await?.into_iter().next())
    }

    /// See [`Database::write_record`]
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn write_record<I, K, V>(&mut self, table: &str, values: I) -> Result<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        let query = query::insert(table, values)?;
        self.run_insert(&query).await
    }

    /// See [`Database::update_records`]
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn update_records<I, K, V>(
        &mut self,
        table: &str,
        values: I,
        predicate: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        let query = query::update(table, values, predicate, params)?;
        self.run_execute(&query).await
    }

    /// See [`Database::delete_records`]
    ///
    /// # Errors
    ///
    /// Build errors, then driver errors.
    pub async fn delete_records(
        &mut self,
        table: &str,
        predicate: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64> {
        let query = query::delete(table, predicate, params)?;
        self.run_execute(&query).await
    }
}

async fn open(config: &DatabaseConfig) -> Result<SqliteConnection> {
    let conn = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| Error::connection(&e))?
        .create_if_missing(config.create_if_missing)
        .connect()
        .await
        .map_err(|e| Error::connection(&e))?;

    info!(url = %config.url, mode = ?config.mode, "Database connection opened");
    Ok(conn)
}

async fn suspend(mode: ExecutionMode) {
    if mode == ExecutionMode::Cooperative {
        tokio::task::yield_now().await;
    }
}

async fn run_raw(conn: &mut SqliteConnection, sql: &str) -> Result<SqliteQueryResult> {
    Executor::execute(&mut *conn, sql)
        .await
        .map_err(|e| Error::execute(&e))
}

fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &[SqlValue]) -> SqliteQuery<'q> {
    for value in params {
        query = match value {
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

async fn run_query(
    conn: &mut SqliteConnection,
    query: &BoundQuery,
    mode: ExecutionMode,
) -> Result<Vec<DbRow>> {
    suspend(mode).await;
    debug!(sql = query.sql(), params = query.params().len(), "Running query");

    let rows = if query.params().is_empty() {
        Executor::fetch_all(&mut *conn, query.sql())
            .await
            .map_err(|e| Error::execute(&e))?
    } else {
        let statement = Executor::prepare(&mut *conn, query.sql())
            .await
            .map_err(|e| Error::prepare(&e))?;
        bind_params(statement.query(), query.params())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::execute(&e))?
    };

    Ok(rows.iter().map(decode_row).collect())
}

async fn run_statement(
    conn: &mut SqliteConnection,
    query: &BoundQuery,
    mode: ExecutionMode,
) -> Result<SqliteQueryResult> {
    suspend(mode).await;
    debug!(sql = query.sql(), params = query.params().len(), "Running statement");

    if query.params().is_empty() {
        return run_raw(conn, query.sql()).await;
    }

    let statement = Executor::prepare(&mut *conn, query.sql())
        .await
        .map_err(|e| Error::prepare(&e))?;
    bind_params(statement.query(), query.params())
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::execute(&e))
}

fn decode_row(row: &SqliteRow) -> DbRow {
    let columns = row
        .columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            (column.name().to_string(), decode_value(row, index))
        })
        .collect();
    DbRow { columns }
}

/// Decode by the value's storage class, not the declared column type
fn decode_value(row: &SqliteRow, index: usize) -> DbValue {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
        _ => return DbValue::Null,
    };

    match storage.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map_or(DbValue::Null, DbValue::Integer),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map_or(DbValue::Null, DbValue::Float),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map_or(DbValue::Null, DbValue::Blob),
        _ => row
            .try_get::<String, _>(index)
            .map_or(DbValue::Null, DbValue::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::select;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn users_db(mode: ExecutionMode) -> Database {
        let db = Database::new(DatabaseConfig::default().with_mode(mode));
        db.run_execute(&BoundQuery::new(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT UNIQUE, score REAL)",
            Vec::new(),
        ))
        .await
        .unwrap();
        db
    }

    async fn count(db: &Database) -> i64 {
        let row = db
            .read_one(&select("users").columns("COUNT(*) AS n"))
            .await
            .unwrap()
            .unwrap();
        row.get("n").and_then(DbValue::as_i64).unwrap()
    }

    #[tokio::test]
    async fn test_connection_is_lazy() {
        let db = Database::new(DatabaseConfig::default());
        assert!(matches!(*db.slot.lock().await, Slot::Pending));
        assert_ok!(db.run_execute(&BoundQuery::new("SELECT 1", Vec::new())).await);
        assert!(matches!(*db.slot.lock().await, Slot::Open(_)));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let config = DatabaseConfig::new("sqlite:///definitely/missing/dir/app.db");
        let err = Database::connect(config).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let config = DatabaseConfig::new(format!("sqlite://{}", path.display()));
        let db = assert_ok!(Database::connect(config).await);
        assert!(path.exists());
        assert_ok!(db.close().await);
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let db = users_db(ExecutionMode::Direct).await;
        let id = db
            .write_record(
                "users",
                [("name", SqlValue::from("ann")), ("score", SqlValue::from(1.5_f64))],
            )
            .await
            .unwrap();
        assert_eq!(id, 1);

        let row = db
            .read_one(&select("users").filter("id = ?", vec![id.into()]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("name").and_then(DbValue::as_str), Some("ann"));
        assert_eq!(row.get("score"), Some(&DbValue::Float(1.5)));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"id":1,"name":"ann","score":1.5}"#
        );
    }

    #[tokio::test]
    async fn test_null_binds() {
        let db = users_db(ExecutionMode::Direct).await;
        db.write_record(
            "users",
            [("name", SqlValue::from("bob")), ("score", SqlValue::from(None::<f64>))],
        )
        .await
        .unwrap();

        let rows = db
            .read_records(&select("users").filter("score IS NULL", Vec::new()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("score"), Some(&DbValue::Null));
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let db = users_db(ExecutionMode::Direct).await;
        for name in ["a", "b", "c"] {
            db.write_record("users", [("name", name)]).await.unwrap();
        }

        let changed = db
            .update_records("users", [("score", 2_i64)], "name <> ?", vec!["a".into()])
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let removed = db
            .delete_records("users", "score = ?", vec![2_i64.into()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rows_keep_driver_order() {
        let db = users_db(ExecutionMode::Direct).await;
        db.write_record("users", [("name", "z")]).await.unwrap();
        let rows = db
            .read_records(&select("users").columns("score, name, id"))
            .await
            .unwrap();
        let names: Vec<&str> = rows[0].iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["score", "name", "id"]);
    }

    #[tokio::test]
    async fn test_prepare_failure_carries_driver_code() {
        let db = users_db(ExecutionMode::Direct).await;
        let err = db
            .run_query(&BoundQuery::new("SELEC name FROM users WHERE id = ?", vec![1_i64.into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PrepareFailed { .. }));
        assert!(err.driver_code().is_some());
    }

    #[tokio::test]
    async fn test_execute_failure_carries_driver_message() {
        let db = users_db(ExecutionMode::Direct).await;
        db.write_record("users", [("name", "dup")]).await.unwrap();
        let err = db.write_record("users", [("name", "dup")]).await.unwrap_err();
        assert!(matches!(err, Error::ExecuteFailed { .. }));
        assert!(err.to_string().contains("UNIQUE"));
        assert!(err.driver_code().is_some());
    }

    #[tokio::test]
    async fn test_validation_happens_before_sql() {
        let db = Database::new(DatabaseConfig::default());
        let err = db
            .write_record("users", Vec::<(&str, SqlValue)>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(matches!(*db.slot.lock().await, Slot::Pending));
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let db = users_db(ExecutionMode::Direct).await;
        let id = db
            .transaction(|tx| {
                Box::pin(async move {
                    let id = tx.write_record("users", [("name", "t1")]).await?;
                    tx.update_records("users", [("score", 9_i64)], "id = ?", vec![id.into()])
                        .await?;
                    Ok::<_, Error>(id)
                })
            })
            .await
            .unwrap();

        let row = db
            .read_one(&select("users").filter("id = ?", vec![id.into()]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("score"), Some(&DbValue::Float(9.0)));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let db = users_db(ExecutionMode::Direct).await;
        db.write_record("users", [("name", "before")]).await.unwrap();
        let before = count(&db).await;

        let result: Result<()> = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.write_record("users", [("name", "inside")]).await?;
                    Err(Error::invalid_argument("work failed"))
                })
            })
            .await;

        let err = assert_err!(result);
        assert!(matches!(err, Error::InvalidArgument { ref reason } if reason == "work failed"));
        assert_eq!(count(&db).await, before);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_driver_error() {
        let db = users_db(ExecutionMode::Direct).await;
        let result: Result<()> = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.write_record("users", [("name", "x")]).await?;
                    tx.write_record("users", [("name", "x")]).await?;
                    Ok::<_, Error>(())
                })
            })
            .await;

        assert!(matches!(result, Err(Error::ExecuteFailed { .. })));
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_transaction_leaves_no_trace() {
        let db = users_db(ExecutionMode::Direct).await;
        db.write_record("users", [("name", "before")]).await.unwrap();
        let before = count(&db).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            db.transaction(|tx| {
                Box::pin(async move {
                    tx.write_record("users", [("name", "partial")]).await?;
                    std::future::pending::<()>().await;
                    Ok::<_, Error>(())
                })
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(count(&db).await, before);

        db.write_record("users", [("name", "after")]).await.unwrap();
        let id = db
            .transaction(|tx| {
                Box::pin(async move {
                    let id = tx.write_record("users", [("name", "next")]).await?;
                    Ok::<_, Error>(id)
                })
            })
            .await;
        assert_ok!(id);
        assert_eq!(count(&db).await, before + 2);

        let partial = db
            .read_one(&select("users").filter("name = ?", vec!["partial".into()]))
            .await
            .unwrap();
        assert!(partial.is_none());
    }

    #[tokio::test]
    async fn test_cooperative_mode_matches_direct() {
        let direct = users_db(ExecutionMode::Direct).await;
        let cooperative = users_db(ExecutionMode::Cooperative).await;

        for db in [&direct, &cooperative] {
            db.write_record("users", [("name", "same")]).await.unwrap();
        }

        let a = direct.read_records(&select("users")).await.unwrap();
        let b = cooperative.read_records(&select("users")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_close_is_final() {
        let db = users_db(ExecutionMode::Direct).await;
        assert_ok!(db.close().await);
        let err = db.read_records(&select("users")).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
        assert_ok!(db.close().await);
    }
}
