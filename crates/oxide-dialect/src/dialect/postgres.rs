//! PostgreSQL dialect.
//!
//! Runs on a native `PgPool` so timestamps, UUIDs and untyped NULLs bind
//! with their PostgreSQL types. Placeholders are `$n` and generated keys
//! come back through `RETURNING`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgPool, PgRow, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Row as _, Type, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

use super::pool::PoolHandle;
use super::{ConnectionState, Dialect};
use crate::dsn::database_name;
use crate::error::{DialectError, Result};
use crate::rows::{ExecResult, Rows};
use crate::typemap::{sized, NativeKind, NativeType};
use crate::value::SqlValue;

/// PostgreSQL dialect.
#[derive(Debug)]
pub struct PostgresDialect {
    handle: PoolHandle<Postgres>,
}

impl PostgresDialect {
    /// Creates an unconnected dialect.
    #[must_use]
    pub fn new(dsn: &str, max_connections: u32) -> Self {
        Self {
            handle: PoolHandle::new("postgres", dsn, max_connections),
        }
    }

    /// Sets how long `close_db` waits for connections held by clones.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.handle.set_close_timeout(timeout);
        self
    }

    /// Name of the database the connection string points at.
    #[must_use]
    pub fn database_name(&self) -> &str {
        database_name(self.handle.dsn())
    }

    /// The connection pool, if connected.
    #[must_use]
    pub const fn pool(&self) -> Option<&PgPool> {
        self.handle.pool()
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        debug!(sql = %sql, args = args.len(), "Executing SQL");
        let mut conn = self.handle.conn().await?;
        let result = bind_all(sqlx::query(sql), args)
            .execute(&mut *conn)
            .await?;
        Ok(ExecResult::new(result.rows_affected(), None))
    }

    async fn fetch(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<PgRow>> {
        debug!(sql = %sql, args = args.len(), "Querying SQL");
        let mut conn = self.handle.conn().await?;
        let rows = bind_all(sqlx::query(sql), args)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

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

/// A NULL whose type the server infers from the statement.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(UntypedNull),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(n) => query.bind(*n),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Bytes(b) => query.bind(b.clone()),
            SqlValue::Timestamp(ts) => query.bind(*ts),
            SqlValue::Uuid(u) => query.bind(*u),
        };
    }
    query
}

fn decode_column(row: &PgRow, index: usize) -> Result<SqlValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }
    let value = match row.column(index).type_info().name() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Int(row.try_get(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get(index)?),
        "BYTEA" => SqlValue::Bytes(row.try_get(index)?),
        "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "DATE" => SqlValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "UUID" => SqlValue::Uuid(row.try_get::<Uuid, _>(index)?),
        other => {
            return Err(DialectError::decode(
                index,
                format!("unsupported column type {other}"),
            ))
        }
    };
    Ok(value)
}

fn to_rows(fetched: &[PgRow]) -> Rows {
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

#[async_trait]
impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    async fn connect(&mut self) -> Result<()> {
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

    fn bind_var(&self, position: usize) -> String {
        format!("${position}")
    }

    fn supports_last_insert_id(&self) -> bool {
        false
    }

    fn has_top(&self) -> bool {
        false
    }

    fn sql_tag(&self, native: &NativeType, size: usize, auto_increment: bool) -> Result<String> {
        let tag = match native.kind {
            NativeKind::Bool => "boolean".to_string(),
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
                    "serial".to_string()
                } else {
                    "integer".to_string()
                }
            }
            NativeKind::Int64 | NativeKind::Uint64 => {
                if auto_increment {
                    "bigserial".to_string()
                } else {
                    "bigint".to_string()
                }
            }
            NativeKind::Float32 => "real".to_string(),
            NativeKind::Float64 => "double precision".to_string(),
            NativeKind::String => sized("varchar", size).unwrap_or_else(|| "text".to_string()),
            NativeKind::Timestamp => "timestamp with time zone".to_string(),
            NativeKind::Bytes => "bytea".to_string(),
            NativeKind::Uuid => "uuid".to_string(),
            NativeKind::Struct | NativeKind::Slice | NativeKind::Map | NativeKind::Other => {
                return Err(native.unsupported(self.name()))
            }
        };
        Ok(tag)
    }

    fn returning_str(&self, table: &str, key: &str) -> String {
        format!("RETURNING {}.{}", self.quote(table), self.quote(key))
    }

    fn select_from_dummy_table(&self) -> String {
        String::new()
    }

    async fn has_table(&mut self, table: &str) -> Result<bool> {
        self.count_probe(
            "has_table",
            "SELECT count(*) FROM information_schema.tables WHERE table_name = $1 AND table_type = 'BASE TABLE'",
            &[table.into()],
        )
        .await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> Result<bool> {
        self.count_probe(
            "has_column",
            "SELECT count(*) FROM information_schema.columns WHERE table_name = $1 AND column_name = $2",
            &[table.into(), column.into()],
        )
        .await
    }

    async fn has_index(&mut self, table: &str, index: &str) -> Result<bool> {
        self.count_probe(
            "has_index",
            "SELECT count(*) FROM pg_indexes WHERE tablename = $1 AND indexname = $2",
            &[table.into(), index.into()],
        )
        .await
    }

    async fn remove_index(&mut self, _table: &str, index: &str) -> Result<()> {
        let sql = format!("DROP INDEX {}", self.quote(index));
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
