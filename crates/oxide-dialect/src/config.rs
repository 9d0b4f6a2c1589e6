//! Dialect configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DialectError, Result};

/// Default size of relational connection pools.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Everything needed to build and connect a dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Driver identifier (`postgres`, `cassandra`, ...). Unknown drivers run
    /// on the common dialect.
    pub driver: String,
    /// Data source descriptor, in the format the driver expects.
    pub dsn: String,
    /// Upper bound on pooled relational connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl DialectConfig {
    /// Creates a configuration with default pool sizing.
    pub fn new(driver: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            dsn: dsn.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Reads `OXIDE_DB_DRIVER`, `DATABASE_URL` and the optional
    /// `OXIDE_DB_MAX_CONNECTIONS` from the environment.
    pub fn from_env() -> Result<Self> {
        let driver = std::env::var("OXIDE_DB_DRIVER")
            .map_err(|_| DialectError::Config("OXIDE_DB_DRIVER is not set".into()))?;
        let dsn = std::env::var("DATABASE_URL")
            .map_err(|_| DialectError::Config("DATABASE_URL is not set".into()))?;
        let max_connections = match std::env::var("OXIDE_DB_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().map_err(|_| {
                DialectError::Config(format!("OXIDE_DB_MAX_CONNECTIONS is not a number: {raw}"))
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            driver,
            dsn,
            max_connections,
        })
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DialectError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parses a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DialectError::Config(e.to_string()))
    }
}
