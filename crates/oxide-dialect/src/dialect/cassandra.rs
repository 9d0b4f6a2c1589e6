//! Cassandra dialect.
//!
//! The store has no multi-statement transactions: every transaction
//! operation fails with [`DialectError::TransactionNotSupported`] whatever
//! the connection state. Schema probes read `system_schema` scoped to the
//! session keyspace.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ConnectionState, Dialect};
use crate::cql::{CqlSession, ScyllaSession};
use crate::dsn::CassandraDsn;
use crate::error::{DialectError, Result};
use crate::rows::{ExecResult, Row, Rows};
use crate::typemap::{NativeKind, NativeType};
use crate::value::SqlValue;

/// Cassandra dialect.
#[derive(Debug)]
pub struct CassandraDialect {
    dsn: CassandraDsn,
    session: Option<Arc<dyn CqlSession>>,
    state: ConnectionState,
}

impl CassandraDialect {
    /// Creates an unconnected dialect from a `keyspace=... hosts=...`
    /// descriptor.
    #[must_use]
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: CassandraDsn::parse(dsn),
            session: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Creates a connected dialect over an existing session.
    #[must_use]
    pub fn with_session(dsn: CassandraDsn, session: Arc<dyn CqlSession>) -> Self {
        Self {
            dsn,
            session: Some(session),
            state: ConnectionState::Connected,
        }
    }

    /// Parsed connection parameters.
    #[must_use]
    pub const fn dsn(&self) -> &CassandraDsn {
        &self.dsn
    }

    fn session(&self) -> Result<&Arc<dyn CqlSession>> {
        self.session.as_ref().ok_or(DialectError::NotConnected)
    }

    async fn run(&self, cql: &str, args: &[SqlValue]) -> Result<Rows> {
        debug!(cql = %cql, args = args.len(), "Running statement");
        self.session()?.execute(cql, args).await
    }

    async fn count_probe(&self, probe: &'static str, cql: &str, args: &[SqlValue]) -> Result<bool> {
        let (count,): (i64,) = Row::from(self.run(cql, args).await)
            .scan()
            .map_err(|e| DialectError::probe(probe, e))?;
        Ok(count > 0)
    }
}

#[async_trait]
impl Dialect for CassandraDialect {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => return Err(DialectError::AlreadyConnected),
            ConnectionState::Closed => return Err(DialectError::ConnectionClosed),
            ConnectionState::Disconnected => {}
        }
        self.dsn.validate()?;

        let session = ScyllaSession::connect(&self.dsn).await?;
        self.session = Some(Arc::new(session));
        self.state = ConnectionState::Connected;
        info!(keyspace = %self.dsn.keyspace, hosts = ?self.dsn.hosts, "CQL session opened");
        Ok(())
    }

    async fn close_db(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            debug!("Close requested on a dialect without a session");
            return Ok(());
        };

        session.close().await;
        self.state = ConnectionState::Closed;

        if !session.is_closed().await {
            return Err(DialectError::CloseFailed("CQL session"));
        }
        info!(keyspace = %self.dsn.keyspace, "CQL session closed");
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        Err(DialectError::TransactionNotSupported)
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        Err(DialectError::TransactionNotSupported)
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        Err(DialectError::TransactionNotSupported)
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn exec(&mut self, query: &str, args: &[SqlValue]) -> Result<ExecResult> {
        self.run(query, args).await?;
        Ok(ExecResult::new(0, None))
    }

    async fn query(&mut self, query: &str, args: &[SqlValue]) -> Result<Rows> {
        self.run(query, args).await
    }

    fn bind_var(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn supports_last_insert_id(&self) -> bool {
        false
    }

    fn has_top(&self) -> bool {
        false
    }

    fn sql_tag(&self, native: &NativeType, _size: usize, auto_increment: bool) -> Result<String> {
        if auto_increment {
            debug!(kind = %native.kind, "No auto-increment columns, ignoring");
        }
        let tag = match native.kind {
            NativeKind::Bool => "boolean",
            NativeKind::Int8
            | NativeKind::Int16
            | NativeKind::Int32
            | NativeKind::Int
            | NativeKind::Uint8
            | NativeKind::Uint16
            | NativeKind::Uint32
            | NativeKind::Uint
            | NativeKind::Uintptr => "int",
            NativeKind::Int64 | NativeKind::Uint64 => "bigint",
            NativeKind::Float32 => "float",
            NativeKind::Float64 => "double",
            NativeKind::String => "varchar",
            NativeKind::Timestamp => "timestamp",
            NativeKind::Bytes => "blob",
            NativeKind::Uuid => "uuid",
            NativeKind::Struct | NativeKind::Slice | NativeKind::Map | NativeKind::Other => {
                return Err(native.unsupported(self.name()))
            }
        };
        Ok(tag.to_string())
    }

    fn returning_str(&self, _table: &str, _key: &str) -> String {
        String::new()
    }

    fn select_from_dummy_table(&self) -> String {
        String::new()
    }

    async fn has_table(&mut self, table: &str) -> Result<bool> {
        self.count_probe(
            "has_table",
            "SELECT count(*) FROM system_schema.tables WHERE keyspace_name = ? AND table_name = ?",
            &[self.dsn.keyspace.as_str().into(), table.into()],
        )
        .await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> Result<bool> {
        self.count_probe(
            "has_column",
            "SELECT count(*) FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ? AND column_name = ?",
            &[self.dsn.keyspace.as_str().into(), table.into(), column.into()],
        )
        .await
    }

    async fn has_index(&mut self, table: &str, index: &str) -> Result<bool> {
        self.count_probe(
            "has_index",
            "SELECT count(*) FROM system_schema.indexes WHERE keyspace_name = ? AND table_name = ? AND index_name = ?",
            &[self.dsn.keyspace.as_str().into(), table.into(), index.into()],
        )
        .await
    }

    async fn remove_index(&mut self, _table: &str, index: &str) -> Result<()> {
        let cql = format!("DROP INDEX {}.{}", self.quote(&self.dsn.keyspace), self.quote(index));
        self.run(&cql, &[])
            .await
            .map(|_| ())
            .map_err(|e| DialectError::index_removal(index, e))
    }

    fn clone_dialect(&self) -> Box<dyn Dialect> {
        Box::new(Self {
            dsn: self.dsn.clone(),
            session: self.session.clone(),
            state: self.state,
        })
    }
}
