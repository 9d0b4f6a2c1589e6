//! Backend dialects.
//!
//! Each dialect knows how to connect to its backend, run statements, drive
//! transaction boundaries, map native types to column types, and probe the
//! backend's schema metadata.
//!
//! - [`CommonDialect`]: generic relational behavior over `sqlx::any`, also
//!   used in compatibility mode for drivers nobody registered.
//! - [`PostgresDialect`]: the common dialect with PostgreSQL overrides.
//! - [`CassandraDialect`]: the distributed store, which has no transactions
//!   and no auto-increment keys.
//!
//! [`new_dialect`] and [`open`] are the only places that call
//! [`Dialect::connect`]. [`build`] hands out an unconnected dialect for
//! policy questions only.

mod cassandra;
mod common;
mod pool;
mod postgres;

pub use cassandra::CassandraDialect;
pub use common::CommonDialect;
pub use pool::DEFAULT_CLOSE_TIMEOUT;
pub use postgres::PostgresDialect;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::DialectConfig;
use crate::error::Result;
use crate::rows::{ExecResult, Row, Rows};
use crate::typemap::NativeType;
use crate::value::SqlValue;

/// Connection lifecycle of a dialect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but not yet connected.
    Disconnected,
    /// Connected and usable.
    Connected,
    /// Closed; terminal.
    Closed,
}

/// Uniform contract between the ORM layer and a backend.
#[async_trait]
pub trait Dialect: Send + std::fmt::Debug {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the connection lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Opens the connection pool or session.
    async fn connect(&mut self) -> Result<()>;

    /// Closes the connection. Closing a dialect that was never connected,
    /// or is already closed, is a no-op. Pooled dialects wait a bounded
    /// time for connections held by clones and then fail with
    /// `CloseFailed`.
    async fn close_db(&mut self) -> Result<()>;

    /// Starts a unit of work.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commits the open unit of work.
    ///
    /// A commit the backend refuses still ends the unit of work: its
    /// changes are rolled back and the dialect is left with no open
    /// transaction, so a retry fails with `NoValidTransaction`.
    async fn commit_transaction(&mut self) -> Result<()>;

    /// Rolls back the open unit of work. As with commit, the dialect has
    /// no open transaction afterwards even if the backend reports an error.
    async fn rollback_transaction(&mut self) -> Result<()>;

    /// Returns whether a unit of work is open.
    fn in_transaction(&self) -> bool;

    /// Runs a statement that returns no rows.
    async fn exec(&mut self, query: &str, args: &[SqlValue]) -> Result<ExecResult>;

    /// Runs a statement and returns a cursor over its rows.
    async fn query(&mut self, query: &str, args: &[SqlValue]) -> Result<Rows>;

    /// Runs a statement expected to return at most one row. Errors are
    /// reported by [`Row::scan`].
    async fn query_row(&mut self, query: &str, args: &[SqlValue]) -> Row {
        Row::from(self.query(query, args).await)
    }

    /// Quotes an identifier (table name, column name, etc.).
    fn quote(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Returns the placeholder for the bound argument at `position` (1-based).
    fn bind_var(&self, position: usize) -> String;

    /// Returns whether `ExecResult::last_insert_id` is meaningful.
    fn supports_last_insert_id(&self) -> bool;

    /// Returns whether row limits are written as `SELECT TOP n`.
    fn has_top(&self) -> bool;

    /// Returns the column type for values of `native`.
    ///
    /// `size` is the declared width (0 for none). Native kinds this backend
    /// cannot store fail with a fatal [`UnsupportedType`] error.
    ///
    /// [`UnsupportedType`]: crate::error::DialectError::UnsupportedType
    fn sql_tag(&self, native: &NativeType, size: usize, auto_increment: bool) -> Result<String>;

    /// Returns the clause that makes an insert return its generated key.
    fn returning_str(&self, table: &str, key: &str) -> String;

    /// Returns the `FROM` clause for selecting constants.
    fn select_from_dummy_table(&self) -> String;

    /// Returns whether the table exists.
    async fn has_table(&mut self, table: &str) -> Result<bool>;

    /// Returns whether the column exists on the table.
    async fn has_column(&mut self, table: &str, column: &str) -> Result<bool>;

    /// Returns whether the index exists on the table.
    async fn has_index(&mut self, table: &str, index: &str) -> Result<bool>;

    /// Drops an index. The backend's error is propagated; existence is not
    /// re-verified.
    async fn remove_index(&mut self, table: &str, index: &str) -> Result<()>;

    /// Returns an independent dialect sharing this one's connection
    /// parameters and pool/session, with no open transaction.
    fn clone_dialect(&self) -> Box<dyn Dialect>;
}

/// Builds and connects the dialect for `driver`.
///
/// Unrecognized drivers run on the [`CommonDialect`] in compatibility mode.
pub async fn new_dialect(driver: &str, dsn: &str) -> Result<Box<dyn Dialect>> {
    open(&DialectConfig::new(driver, dsn)).await
}

/// Builds and connects the dialect described by `config`.
pub async fn open(config: &DialectConfig) -> Result<Box<dyn Dialect>> {
    let mut dialect = build(config);
    dialect.connect().await?;
    info!(dialect = dialect.name(), driver = %config.driver, "Dialect connected");

    Ok(dialect)
}

/// Selects the dialect for `config.driver` without connecting it.
///
/// The result only answers policy questions (placeholders, type tags,
/// quoting) until it goes through [`open`].
pub fn build(config: &DialectConfig) -> Box<dyn Dialect> {
    match config.driver.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Box::new(PostgresDialect::new(
            &config.dsn,
            config.max_connections,
        )),
        "cassandra" => Box::new(CassandraDialect::new(&config.dsn)),
        _ => {
            warn!(
                driver = %config.driver,
                "Driver is not officially supported, running under compatibility mode"
            );
            Box::new(CommonDialect::new(
                &config.driver,
                &config.dsn,
                config.max_connections,
            ))
        }
    }
}
