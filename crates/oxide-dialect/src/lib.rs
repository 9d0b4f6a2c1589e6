//! Backend dialects for the oxide ORM.
//!
//! `oxide-dialect` puts relational databases and a distributed column store
//! behind one async [`Dialect`] contract. The ORM layer opens a dialect by
//! driver name and then asks it to:
//!
//! - Connect, close, and drive transaction boundaries
//! - Run statements with positional arguments and read back rows
//! - Map native Rust types to the backend's column types
//! - Probe the schema for tables, columns and indexes
//!
//! # Dialects
//!
//! | Driver                   | Dialect               | Placeholders | Transactions |
//! |--------------------------|-----------------------|--------------|--------------|
//! | `postgres`, `postgresql` | [`PostgresDialect`]   | `$1`, `$2`   | yes          |
//! | `cassandra`              | [`CassandraDialect`]  | `?`          | no           |
//! | anything else            | [`CommonDialect`]     | `?`          | yes          |
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_dialect::prelude::*;
//!
//! let mut db = new_dialect("sqlite", "sqlite::memory:").await?;
//!
//! let tag = db.sql_tag(&NativeType::of::<i64>(), 0, true)?;
//! db.exec(&format!("CREATE TABLE users (id {tag} PRIMARY KEY, name TEXT)"), &[])
//!     .await?;
//!
//! db.begin_transaction().await?;
//! db.exec("INSERT INTO users (name) VALUES (?)", &["ada".into()]).await?;
//! db.commit_transaction().await?;
//!
//! let (count,): (i64,) = db.query_row("SELECT count(*) FROM users", &[]).await.scan()?;
//! db.close_db().await?;
//! ```

pub mod config;
pub mod cql;
pub mod dialect;
pub mod dsn;
pub mod error;
pub mod rows;
pub mod typemap;
pub mod value;

pub use config::DialectConfig;
pub use dialect::{new_dialect, open, Dialect};
pub use error::{DialectError, ErrorKind, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::DialectConfig;
    pub use crate::dialect::{
        build, new_dialect, open, CassandraDialect, CommonDialect, ConnectionState, Dialect,
        PostgresDialect,
    };
    pub use crate::error::{DialectError, ErrorKind, Result};
    pub use crate::rows::{ExecResult, Row, Rows};
    pub use crate::typemap::{HasNativeKind, NativeKind, NativeType};
    pub use crate::value::{FromRow, FromSqlValue, SqlValue};
}
