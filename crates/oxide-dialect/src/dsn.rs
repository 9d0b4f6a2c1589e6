//! Data source descriptor parsing.

use tracing::warn;

use crate::error::{DialectError, Result};

/// Connection parameters for the distributed store.
///
/// Parsed from a space-separated `key=value` string with the keys
/// `keyspace` and `hosts` (comma-separated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CassandraDsn {
    /// Keyspace the session is bound to.
    pub keyspace: String,
    /// Contact points.
    pub hosts: Vec<String>,
}

impl CassandraDsn {
    /// Parses a descriptor such as `keyspace=app hosts=10.0.0.1,10.0.0.2`.
    ///
    /// Parsing is lenient: unknown keys and tokens without `=` are skipped
    /// with a warning, and missing keys are left empty. Use
    /// [`CassandraDsn::validate`] before connecting.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut dsn = Self::default();

        for token in source.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                warn!(token = %token, "Ignoring malformed data source token");
                continue;
            };
            match key {
                "keyspace" => dsn.keyspace = value.to_string(),
                "hosts" => {
                    dsn.hosts = value
                        .split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(ToString::to_string)
                        .collect();
                }
                other => warn!(key = %other, "Ignoring unknown data source key"),
            }
        }

        dsn
    }

    /// Checks that the keys needed to open a session are present.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(DialectError::InvalidDsn("missing `hosts`".to_string()));
        }
        if self.keyspace.is_empty() {
            return Err(DialectError::InvalidDsn("missing `keyspace`".to_string()));
        }
        Ok(())
    }
}

/// Extracts the database name from a relational connection string.
///
/// This is the text between the last `/` and the first `?`, so
/// `postgres://u:p@host:5432/shop?sslmode=disable` yields `shop`.
#[must_use]
pub fn database_name(dsn: &str) -> &str {
    let end = dsn.find('?').unwrap_or(dsn.len());
    let path = &dsn[..end];
    let start = path.rfind('/').map_or(0, |i| i + 1);
    &path[start..]
}
