//! Common relational dialect.
//!
//! Connects through `sqlx::any`, so the scheme of the connection string
//! selects the concrete driver. Arguments without an any-driver type
//! (timestamps, UUIDs) travel as text.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row as _, ValueRef};
use tracing::debug;

use super::pool::PoolHandle;
use super::{ConnectionState, Dialect};
use crate::dsn::database_name;
use crate::error::{DialectError, Result};
use crate::rows::{ExecResult, Rows};
use crate::typemap::{sized, NativeKind, NativeType, MAX_FIELD_WIDTH};
use crate::value::SqlValue;

/// Generic relational dialect.
#[derive(Debug)]
pub struct CommonDialect {
    handle: PoolHandle<Any>,
}

impl CommonDialect {
    /// Creates an unconnected dialect.
    #[must_use]
    pub fn new(driver: &str, dsn: &str, max_connections: u32) -> Self {
        Self {
            handle: PoolHandle::new(driver, dsn, max_connections),
        }
    }

    /// Sets how long `close_db` waits for connections held by clones.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.handle.set_close_timeout(timeout);
        self
    }

    /// Driver identifier this dialect was built for.
    #[must_use]
    pub fn driver(&self) -> &str {
        self.handle.driver()
    }

    /// Name of the database the connection string points at.
    #[must_use]
    pub fn database_name(&self) -> &str {
        database_name(self.handle.dsn())
    }

    /// The connection pool, if connected.
    #[must_use]
    pub const fn pool(&self) -> Option<&AnyPool> {
        self.handle.pool()
    }

    // The any driver reports no insert id for SQLite
    fn reads_rowid(&self, sql: &str) -> bool {
        self.handle.dsn().starts_with("sqlite:") && is_insert(sql)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        debug!(sql = %sql, args = args.len(), "Executing SQL");
        let reads_rowid = self.reads_rowid(sql);
        let mut conn = self.handle.conn().await?;

        let result = bind_all(sqlx::query(sql), args)
            .execute(&mut *conn)
            .await?;
        let mut last_insert_id = result.last_insert_id();
        if last_insert_id.is_none() && reads_rowid && result.rows_affected() > 0 {
            let (rowid,): (i64,) = sqlx::query_as("SELECT last_insert_rowid()")
                .fetch_one(&mut *conn)
                .await?;
            last_insert_id = Some(rowid);
        }
        Ok(ExecResult::new(result.rows_affected(), last_insert_id))
    }

    async fn fetch(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<AnyRow>> {
        debug!(sql = %sql, args = args.len(), "Querying SQL");
        let mut conn = self.handle.conn().await?;
        let rows = bind_all(sqlx::query(sql), args)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Runs a `count(*)` probe; any failure is reported, never read as zero.
    async fn count_probe(
        &mut self,
        probe: &'static str,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<bool> {
        let (count,): (i64,) = self
            .query_row(sql, args)
            .await
            .scan()
            .map_err(|e| DialectError::probe(probe, e))?;
        Ok(count > 0)
    }
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|word| word.eq_ignore_ascii_case(kw))
    })
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    args: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(n) => query.bind(*n),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Bytes(b) => query.bind(b.clone()),
            // The any driver has no temporal or uuid types; both travel as text
            SqlValue::Timestamp(ts) => query.bind(ts.to_rfc3339()),
            SqlValue::Uuid(u) => query.bind(u.to_string()),
        };
    }
    query
}

fn decode_column(row: &AnyRow, index: usize) -> Result<SqlValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(SqlValue::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(SqlValue::Float(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(SqlValue::Bytes(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(SqlValue::Bool(v));
    }
    Err(DialectError::decode(
        index,
        format!("unsupported column type {}", row.column(index).type_info()),
    ))
}

fn to_rows(fetched: &[AnyRow]) -> Rows {
    let columns: Vec<String> = fetched
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut values = Vec::with_capacity(fetched.len());
    for row in fetched {
        let decoded: Result<Vec<SqlValue>> =
            (0..row.columns().len()).map(|i| decode_column(row, i)).collect();
        match decoded {
            Ok(v) => values.push(v),
            Err(err) => return Rows::truncated(columns, values, err),
        }
    }
    Rows::new(columns, values)
}

/// Type mapping shared by relational backends without their own vocabulary.
fn common_sql_tag(
    dialect: &'static str,
    native: &NativeType,
    size: usize,
    auto_increment: bool,
) -> Result<String> {
    let tag = match native.kind {
        NativeKind::Bool => "BOOLEAN".to_string(),
        NativeKind::Int8
        | NativeKind::Int16
        | NativeKind::Int32
        | NativeKind::Int
        | NativeKind::Uint8
        | NativeKind::Uint16
        | NativeKind::Uint32
        | NativeKind::Uint
        | NativeKind::Uintptr => {
            if auto_increment {
                "INTEGER AUTO_INCREMENT".to_string()
            } else {
                "INTEGER".to_string()
            }
        }
        NativeKind::Int64 | NativeKind::Uint64 => {
            if auto_increment {
                "BIGINT AUTO_INCREMENT".to_string()
            } else {
                "BIGINT".to_string()
            }
        }
        NativeKind::Float32 | NativeKind::Float64 => "FLOAT".to_string(),
        NativeKind::String => {
            sized("VARCHAR", size).unwrap_or_else(|| format!("VARCHAR({MAX_FIELD_WIDTH})"))
        }
        NativeKind::Timestamp => "TIMESTAMP".to_string(),
        NativeKind::Bytes => {
            sized("BINARY", size).unwrap_or_else(|| format!("BINARY({MAX_FIELD_WIDTH})"))
        }
        NativeKind::Uuid
        | NativeKind::Struct
        | NativeKind::Slice
        | NativeKind::Map
        | NativeKind::Other => return Err(native.unsupported(dialect)),
    };
    Ok(tag)
}

#[async_trait]
impl Dialect for CommonDialect {
    fn name(&self) -> &'static str {
        "common"
    }

    fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    async fn connect(&mut self) -> Result<()> {
        sqlx::any::install_default_drivers();
        self.handle.connect().await
    }

    async fn close_db(&mut self) -> Result<()> {
        self.handle.close().await
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.handle.begin().await
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        self.handle.commit().await
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        self.handle.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.handle.in_transaction()
    }

    async fn exec(&mut self, query: &str, args: &[SqlValue]) -> Result<ExecResult> {
        self.execute(query, args).await
    }

    async fn query(&mut self, query: &str, args: &[SqlValue]) -> Result<Rows> {
        let fetched = self.fetch(query, args).await?;
        Ok(to_rows(&fetched))
    }

    fn bind_var(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn supports_last_insert_id(&self) -> bool {
        true
    }

    fn has_top(&self) -> bool {
        false
    }

    fn sql_tag(&self, native: &NativeType, size: usize, auto_increment: bool) -> Result<String> {
        common_sql_tag(self.name(), native, size, auto_increment)
    }

    fn returning_str(&self, _table: &str, _key: &str) -> String {
        String::new()
    }

    fn select_from_dummy_table(&self) -> String {
        String::new()
    }

    async fn has_table(&mut self, table: &str) -> Result<bool> {
        let schema = self.database_name().to_string();
        self.count_probe(
            "has_table",
            "SELECT count(*) FROM INFORMATION_SCHEMA.TABLES WHERE table_name = ? AND table_schema = ?",
            &[table.into(), schema.into()],
        )
        .await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> Result<bool> {
        let schema = self.database_name().to_string();
        self.count_probe(
            "has_column",
            "SELECT count(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema = ? AND table_name = ? AND column_name = ?",
            &[schema.into(), table.into(), column.into()],
        )
        .await
    }

    async fn has_index(&mut self, table: &str, index: &str) -> Result<bool> {
        self.count_probe(
            "has_index",
            "SELECT count(*) FROM INFORMATION_SCHEMA.STATISTICS WHERE table_name = ? AND index_name = ?",
            &[table.into(), index.into()],
        )
        .await
    }

    async fn remove_index(&mut self, table: &str, index: &str) -> Result<()> {
        let sql = format!("DROP INDEX {} ON {}", index, self.quote(table));
        self.execute(&sql, &[])
            .await
            .map(|_| ())
            .map_err(|e| DialectError::index_removal(index, e))
    }

    fn clone_dialect(&self) -> Box<dyn Dialect> {
        Box::new(Self {
            handle: self.handle.share(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    async fn connected() -> CommonDialect {
        let mut dialect = CommonDialect::new("sqlite", "sqlite::memory:", 1);
        dialect.connect().await.unwrap();
        dialect
            .exec(
                "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, score REAL, avatar BLOB)",
                &[],
            )
            .await
            .unwrap();
        dialect
    }

    async fn user_count(dialect: &mut CommonDialect) -> i64 {
        let (n,): (i64,) = dialect
            .query_row("SELECT count(*) FROM users", &[])
            .await
            .scan()
            .unwrap();
        n
    }

    #[test]
    fn test_sql_tags() {
        let d = CommonDialect::new("mysql", "", 1);
        let tag = |ty: NativeType, size, auto| d.sql_tag(&ty, size, auto).unwrap();

        assert_eq!(tag(NativeType::of::<bool>(), 0, false), "BOOLEAN");
        assert_eq!(tag(NativeType::of::<u16>(), 0, false), "INTEGER");
        assert_eq!(tag(NativeType::of::<i32>(), 0, true), "INTEGER AUTO_INCREMENT");
        assert_eq!(tag(NativeType::of::<i64>(), 0, true), "BIGINT AUTO_INCREMENT");
        assert_eq!(tag(NativeType::of::<u64>(), 0, false), "BIGINT");
        assert_eq!(tag(NativeType::of::<f32>(), 0, false), "FLOAT");
        assert_eq!(tag(NativeType::of::<String>(), 255, false), "VARCHAR(255)");
        assert_eq!(tag(NativeType::of::<String>(), 0, false), "VARCHAR(65532)");
        assert_eq!(tag(NativeType::of::<String>(), 70000, false), "VARCHAR(65532)");
        assert_eq!(
            tag(NativeType::of::<chrono::DateTime<chrono::Utc>>(), 0, false),
            "TIMESTAMP"
        );
        assert_eq!(tag(NativeType::of::<Vec<u8>>(), 16, false), "BINARY(16)");
        assert_eq!(tag(NativeType::of::<Vec<u8>>(), 0, false), "BINARY(65532)");
    }

    #[test]
    fn test_unsupported_tags_fail() {
        let d = CommonDialect::new("mysql", "", 1);
        let err = d.sql_tag(&NativeType::of::<uuid::Uuid>(), 0, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Classification);

        let map = NativeType::new(
            NativeKind::Map,
            std::any::type_name::<HashMap<String, String>>(),
        );
        let err = d.sql_tag(&map, 0, false).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("HashMap"));
    }

    #[test]
    fn test_policy() {
        let d = CommonDialect::new("mysql", "root@tcp(localhost)/shop?parseTime=true", 1);
        assert_eq!(d.quote("users"), "\"users\"");
        assert_eq!(d.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(d.bind_var(3), "?");
        assert_eq!(d.returning_str("users", "id"), "");
        assert_eq!(d.select_from_dummy_table(), "");
        assert_eq!(d.database_name(), "shop");
    }

    #[tokio::test]
    async fn test_exec_and_query() {
        let mut d = connected().await;

        let res = d
            .exec(
                "INSERT INTO users (name, score, avatar) VALUES (?, ?, ?)",
                &["ada".into(), 9.5.into(), vec![1_u8, 2].into()],
            )
            .await
            .unwrap();
        assert_eq!(res.rows_affected(), 1);
        assert_eq!(res.last_insert_id().unwrap(), 1);

        d.exec(
            "INSERT INTO users (name, score) VALUES (?, ?)",
            &["grace".into(), SqlValue::Null],
        )
        .await
        .unwrap();

        let mut rows = d
            .query("SELECT id, name, score, avatar FROM users ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.columns().unwrap(), ["id", "name", "score", "avatar"]);

        assert!(rows.next());
        let (id, name, score, avatar): (i64, String, Option<f64>, Option<Vec<u8>>) =
            rows.scan().unwrap();
        assert_eq!((id, name.as_str()), (1, "ada"));
        assert_eq!(score, Some(9.5));
        assert_eq!(avatar, Some(vec![1, 2]));

        assert!(rows.next());
        let (_, name, score, avatar): (i64, String, Option<f64>, Option<Vec<u8>>) =
            rows.scan().unwrap();
        assert_eq!(name, "grace");
        assert!(score.is_none() && avatar.is_none());

        assert!(!rows.next());
        rows.close();
    }

    #[tokio::test]
    async fn test_last_insert_id_inside_transaction() {
        let mut d = connected().await;
        d.exec("INSERT INTO users (name) VALUES (?)", &["ada".into()])
            .await
            .unwrap();

        d.begin_transaction().await.unwrap();
        let res = d
            .exec("INSERT INTO users (name) VALUES (?)", &["grace".into()])
            .await
            .unwrap();
        assert_eq!(res.last_insert_id().unwrap(), 2);
        d.commit_transaction().await.unwrap();

        let res = d
            .exec(
                "UPDATE users SET name = ? WHERE id = ?",
                &["barbara".into(), 2_i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(res.rows_affected(), 1);
        assert!(res.last_insert_id().is_err());
    }

    #[tokio::test]
    async fn test_query_row_no_rows() {
        let mut d = connected().await;
        let row = d
            .query_row("SELECT id FROM users WHERE name = ?", &["nobody".into()])
            .await;
        assert!(matches!(row.scan::<(i64,)>(), Err(DialectError::NoRows)));
    }

    #[tokio::test]
    async fn test_query_error_deferred_to_scan() {
        let mut d = connected().await;
        let row = d.query_row("SELECT * FROM missing_table", &[]).await;
        assert!(matches!(row.scan::<(i64,)>(), Err(DialectError::Database(_))));
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let mut d = connected().await;

        d.begin_transaction().await.unwrap();
        assert!(d.in_transaction());
        d.exec("INSERT INTO users (name) VALUES (?)", &["kept".into()])
            .await
            .unwrap();
        d.commit_transaction().await.unwrap();
        assert!(!d.in_transaction());
        assert_eq!(user_count(&mut d).await, 1);

        d.begin_transaction().await.unwrap();
        d.exec("INSERT INTO users (name) VALUES (?)", &["dropped".into()])
            .await
            .unwrap();
        d.rollback_transaction().await.unwrap();
        assert_eq!(user_count(&mut d).await, 1);
    }

    #[tokio::test]
    async fn test_no_valid_transaction() {
        let mut d = connected().await;
        assert!(matches!(
            d.commit_transaction().await,
            Err(DialectError::NoValidTransaction)
        ));
        assert!(matches!(
            d.rollback_transaction().await,
            Err(DialectError::NoValidTransaction)
        ));

        d.begin_transaction().await.unwrap();
        d.commit_transaction().await.unwrap();
        assert!(matches!(
            d.commit_transaction().await,
            Err(DialectError::NoValidTransaction)
        ));
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let mut d = connected().await;
        d.begin_transaction().await.unwrap();
        assert!(matches!(
            d.begin_transaction().await,
            Err(DialectError::CantStartTransaction(None))
        ));
        assert!(d.in_transaction());
        d.rollback_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_commit_ends_transaction() {
        let mut d = connected().await;
        d.exec("PRAGMA foreign_keys = ON", &[]).await.unwrap();
        d.exec("CREATE TABLE teams (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        d.exec(
            "CREATE TABLE members (id INTEGER PRIMARY KEY, team_id INTEGER REFERENCES teams(id) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .await
        .unwrap();

        d.begin_transaction().await.unwrap();
        d.exec("INSERT INTO members (team_id) VALUES (?)", &[42_i64.into()])
            .await
            .unwrap();
        let err = d.commit_transaction().await.unwrap_err();
        assert!(matches!(err, DialectError::Database(_)));

        assert!(!d.in_transaction());
        assert!(matches!(
            d.commit_transaction().await,
            Err(DialectError::NoValidTransaction)
        ));
        let (members,): (i64,) = d
            .query_row("SELECT count(*) FROM members", &[])
            .await
            .scan()
            .unwrap();
        assert_eq!(members, 0);
    }

    #[tokio::test]
    async fn test_begin_without_connection() {
        let mut d = CommonDialect::new("sqlite", "sqlite::memory:", 1);
        assert!(matches!(
            d.begin_transaction().await,
            Err(DialectError::CantStartTransaction(None))
        ));
    }

    #[tokio::test]
    async fn test_clone_does_not_share_transaction() {
        let mut d = connected().await;
        d.begin_transaction().await.unwrap();

        let clone = d.clone_dialect();
        assert!(!clone.in_transaction());
        assert_eq!(clone.state(), ConnectionState::Connected);
        assert_eq!(clone.name(), "common");

        d.rollback_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_absence() {
        // SQLite has no INFORMATION_SCHEMA, so the probe cannot answer
        let mut d = connected().await;
        let err = d.has_table("users").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Probe);
    }

    #[tokio::test]
    async fn test_remove_index_propagates_error() {
        let mut d = connected().await;
        let err = d.remove_index("users", "idx_missing").await.unwrap_err();
        assert!(matches!(err, DialectError::IndexRemoval { ref index, .. } if index == "idx_missing"));
    }

    #[tokio::test]
    async fn test_close_lifecycle() {
        let mut never = CommonDialect::new("sqlite", "sqlite::memory:", 1);
        never.close_db().await.unwrap();
        assert_eq!(never.state(), ConnectionState::Disconnected);

        let mut d = connected().await;
        d.close_db().await.unwrap();
        assert_eq!(d.state(), ConnectionState::Closed);
        d.close_db().await.unwrap();

        assert!(matches!(
            d.exec("SELECT 1", &[]).await,
            Err(DialectError::NotConnected)
        ));
        assert!(matches!(
            d.connect().await,
            Err(DialectError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_gives_up_on_borrowed_connection() {
        let mut d = connected()
            .await
            .close_timeout(Duration::from_millis(200));
        let mut clone = d.clone_dialect();
        clone.begin_transaction().await.unwrap();

        assert!(matches!(
            d.close_db().await,
            Err(DialectError::CloseFailed(_))
        ));
        assert_eq!(d.state(), ConnectionState::Closed);

        clone.rollback_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_twice() {
        let mut d = connected().await;
        assert!(matches!(
            d.connect().await,
            Err(DialectError::AlreadyConnected)
        ));
    }
}
