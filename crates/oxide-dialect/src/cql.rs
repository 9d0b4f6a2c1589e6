//! Sessions against the distributed column store.
//!
//! [`CassandraDialect`] talks to the cluster through the [`CqlSession`]
//! trait. [`ScyllaSession`] implements it over the `scylla` driver.
//!
//! [`CassandraDialect`]: crate::dialect::CassandraDialect

use std::fmt;

use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::value::{CqlTimestamp, CqlValue, Row as CqlRow};
use scylla_cql::frame::response::result::{ColumnType, NativeType};
use tokio::sync::RwLock;
use tracing::debug;

use crate::dsn::CassandraDsn;
use crate::error::{DialectError, Result};
use crate::rows::Rows;
use crate::value::SqlValue;

/// An open session against the cluster.
#[async_trait]
pub trait CqlSession: Send + Sync + fmt::Debug {
    /// Runs a CQL statement with positional `?` arguments.
    ///
    /// The argument count must match the statement's markers. Statements that return no rows yield an empty cursor.
    async fn execute(&self, cql: &str, args: &[SqlValue]) -> Result<Rows>;

    /// Closes the session.
    async fn close(&self);

    /// Returns whether the session is closed.
    ///
    /// Implementations report what they can observe; a wrapper that cannot
    /// see the driver's connections reports only its own close.
    async fn is_closed(&self) -> bool;
}

/// [`CqlSession`] backed by the `scylla` driver.
///
/// The driver keeps no closed state of its own, so [`CqlSession::is_closed`]
/// only reports whether this wrapper has dropped its session. It turns true
/// after [`CqlSession::close`] and never because the cluster went away.
pub struct ScyllaSession {
    inner: RwLock<Option<Session>>,
}

impl ScyllaSession {
    /// Builds the cluster description from the DSN's hosts and opens a
    /// session bound to its keyspace.
    pub async fn connect(dsn: &CassandraDsn) -> Result<Self> {
        let session = SessionBuilder::new()
            .known_nodes(&dsn.hosts)
            .use_keyspace(&dsn.keyspace, false)
            .build()
            .await
            .map_err(DialectError::cql)?;

        Ok(Self {
            inner: RwLock::new(Some(session)),
        })
    }
}

impl fmt::Debug for ScyllaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScyllaSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl CqlSession for ScyllaSession {
    async fn execute(&self, cql: &str, args: &[SqlValue]) -> Result<Rows> {
        let guard = self.inner.read().await;
        let session = guard.as_ref().ok_or(DialectError::NotConnected)?;

        let result = if args.is_empty() {
            session
                .query_unpaged(cql, ())
                .await
                .map_err(DialectError::cql)?
        } else {
            // Bound values are shaped to the column types the server reports
            let prepared = session.prepare(cql).await.map_err(DialectError::cql)?;
            let specs = prepared.get_variable_col_specs();
            check_arity(specs.len(), args.len())?;
            let values: Vec<Option<CqlValue>> = args
                .iter()
                .zip(specs.iter())
                .map(|(value, spec)| to_cql(value, spec.typ()))
                .collect();
            session
                .execute_unpaged(&prepared, values)
                .await
                .map_err(DialectError::cql)?
        };

        if !result.is_rows() {
            return Ok(Rows::empty());
        }

        let rows = result.into_rows_result().map_err(DialectError::cql)?;
        let columns: Vec<String> = rows
            .column_specs()
            .iter()
            .map(|spec| spec.name().to_string())
            .collect();

        let mut values = Vec::new();
        for row in rows.rows::<CqlRow>().map_err(DialectError::cql)? {
            match row {
                Ok(row) => values.push(row.columns.into_iter().map(from_cql).collect()),
                Err(err) => return Ok(Rows::truncated(columns, values, DialectError::cql(err))),
            }
        }
        Ok(Rows::new(columns, values))
    }

    async fn close(&self) {
        if self.inner.write().await.take().is_some() {
            debug!("CQL session dropped");
        }
    }

    async fn is_closed(&self) -> bool {
        self.inner.read().await.is_none()
    }
}

fn check_arity(expected: usize, given: usize) -> Result<()> {
    if expected == given {
        Ok(())
    } else {
        Err(DialectError::ArgumentCount { expected, given })
    }
}

fn to_cql(value: &SqlValue, typ: &ColumnType<'_>) -> Option<CqlValue> {
    let native = match typ {
        ColumnType::Native(native) => Some(native),
        _ => None,
    };

    let cql = match (value, native) {
        (SqlValue::Null, _) => return None,
        (SqlValue::Bool(b), _) => CqlValue::Boolean(*b),
        (SqlValue::Int(n), Some(NativeType::Int)) => {
            i32::try_from(*n).map_or(CqlValue::BigInt(*n), CqlValue::Int)
        }
        (SqlValue::Int(n), Some(NativeType::SmallInt)) => {
            i16::try_from(*n).map_or(CqlValue::BigInt(*n), CqlValue::SmallInt)
        }
        (SqlValue::Int(n), Some(NativeType::TinyInt)) => {
            i8::try_from(*n).map_or(CqlValue::BigInt(*n), CqlValue::TinyInt)
        }
        (SqlValue::Int(n), _) => CqlValue::BigInt(*n),
        #[allow(clippy::cast_possible_truncation)]
        (SqlValue::Float(f), Some(NativeType::Float)) => CqlValue::Float(*f as f32),
        (SqlValue::Float(f), _) => CqlValue::Double(*f),
        (SqlValue::Text(s), Some(NativeType::Ascii)) => CqlValue::Ascii(s.clone()),
        (SqlValue::Text(s), _) => CqlValue::Text(s.clone()),
        (SqlValue::Bytes(b), _) => CqlValue::Blob(b.clone()),
        (SqlValue::Timestamp(ts), _) => CqlValue::Timestamp(CqlTimestamp(ts.timestamp_millis())),
        (SqlValue::Uuid(u), _) => CqlValue::Uuid(*u),
    };
    Some(cql)
}

fn from_cql(value: Option<CqlValue>) -> SqlValue {
    match value {
        None | Some(CqlValue::Empty) => SqlValue::Null,
        Some(CqlValue::Boolean(b)) => SqlValue::Bool(b),
        Some(CqlValue::TinyInt(n)) => SqlValue::Int(i64::from(n)),
        Some(CqlValue::SmallInt(n)) => SqlValue::Int(i64::from(n)),
        Some(CqlValue::Int(n)) => SqlValue::Int(i64::from(n)),
        Some(CqlValue::BigInt(n)) => SqlValue::Int(n),
        Some(CqlValue::Counter(c)) => SqlValue::Int(c.0),
        Some(CqlValue::Float(f)) => SqlValue::Float(f64::from(f)),
        Some(CqlValue::Double(f)) => SqlValue::Float(f),
        Some(CqlValue::Text(s) | CqlValue::Ascii(s)) => SqlValue::Text(s),
        Some(CqlValue::Blob(b)) => SqlValue::Bytes(b),
        Some(CqlValue::Uuid(u)) => SqlValue::Uuid(u),
        Some(CqlValue::Timeuuid(u)) => SqlValue::Uuid(u.into()),
        Some(CqlValue::Timestamp(ts)) => chrono::DateTime::from_timestamp_millis(ts.0)
            .map_or(SqlValue::Int(ts.0), SqlValue::Timestamp),
        // Collections, UDTs and the remaining scalars keep their CQL text form
        Some(other) => SqlValue::Text(format!("{other:?}")),
    }
}
