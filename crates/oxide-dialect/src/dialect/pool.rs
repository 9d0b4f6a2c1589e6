//! Pooled connection lifecycle shared by the relational dialects.
//!
//! [`PoolHandle`] owns the pool, the open transaction and the connection
//! state. Binding arguments and decoding rows stay with each dialect, since
//! they depend on the concrete driver.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::{Database, Pool, Transaction};
use tracing::{debug, info, warn};

use super::ConnectionState;
use crate::error::{DialectError, Result};

/// How long closing a pool waits for connections borrowed by clones.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct PoolHandle<DB: Database> {
    driver: String,
    dsn: String,
    max_connections: u32,
    close_timeout: Duration,
    pool: Option<Pool<DB>>,
    tx: Option<Transaction<'static, DB>>,
    state: ConnectionState,
}

/// The connection a statement runs on: the open transaction, or one
/// borrowed from the pool for the statement's duration.
pub(crate) enum Conn<'a, DB: Database> {
    Tx(&'a mut Transaction<'static, DB>),
    Pooled(PoolConnection<DB>),
}

impl<DB: Database> Deref for Conn<'_, DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Tx(tx) => tx,
            Self::Pooled(conn) => conn,
        }
    }
}

impl<DB: Database> DerefMut for Conn<'_, DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Tx(tx) => tx,
            Self::Pooled(conn) => conn,
        }
    }
}

impl<DB: Database> PoolHandle<DB> {
    pub(crate) fn new(driver: &str, dsn: &str, max_connections: u32) -> Self {
        Self {
            driver: driver.to_string(),
            dsn: dsn.to_string(),
            max_connections,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            pool: None,
            tx: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub(crate) fn driver(&self) -> &str {
        &self.driver
    }

    pub(crate) fn dsn(&self) -> &str {
        &self.dsn
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) const fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) const fn pool(&self) -> Option<&Pool<DB>> {
        self.pool.as_ref()
    }

    pub(crate) fn set_close_timeout(&mut self, timeout: Duration) {
        self.close_timeout = timeout;
    }

    /// Same parameters and pool, no transaction.
    pub(crate) fn share(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            dsn: self.dsn.clone(),
            max_connections: self.max_connections,
            close_timeout: self.close_timeout,
            pool: self.pool.clone(),
            tx: None,
            state: self.state,
        }
    }

    fn connected(&self) -> Result<&Pool<DB>> {
        match (self.state, self.pool.as_ref()) {
            (ConnectionState::Connected, Some(pool)) => Ok(pool),
            _ => Err(DialectError::NotConnected),
        }
    }

    pub(crate) async fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => return Err(DialectError::AlreadyConnected),
            ConnectionState::Closed => return Err(DialectError::ConnectionClosed),
            ConnectionState::Disconnected => {}
        }

        let pool = PoolOptions::<DB>::new()
            .max_connections(self.max_connections)
            .connect(&self.dsn)
            .await?;

        self.pool = Some(pool);
        self.state = ConnectionState::Connected;
        debug!(driver = %self.driver, "Connection pool opened");
        Ok(())
    }

    pub(crate) async fn close(&mut self) -> Result<()> {
        let Some(pool) = self.pool.take() else {
            debug!(driver = %self.driver, "Close requested on a dialect without a pool");
            return Ok(());
        };

        if let Some(tx) = self.tx.take() {
            warn!("Closing with an open transaction, rolling back");
            if let Err(err) = tx.rollback().await {
                warn!(error = %err, "Rollback before close failed");
            }
        }
        self.state = ConnectionState::Closed;

        // Connections held by clones only return when their owner lets go
        if tokio::time::timeout(self.close_timeout, pool.close())
            .await
            .is_err()
        {
            warn!(
                driver = %self.driver,
                timeout = ?self.close_timeout,
                "Connections still borrowed after close timeout"
            );
            return Err(DialectError::CloseFailed("connection pool"));
        }
        if !pool.is_closed() {
            return Err(DialectError::CloseFailed("connection pool"));
        }
        info!(driver = %self.driver, "Connection pool closed");
        Ok(())
    }

    pub(crate) async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(DialectError::CantStartTransaction(None));
        }
        let pool = self
            .connected()
            .map_err(|_| DialectError::CantStartTransaction(None))?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| DialectError::CantStartTransaction(Some(e)))?;
        self.tx = Some(tx);
        debug!("Transaction started");
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DialectError::NoValidTransaction)?;
        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DialectError::NoValidTransaction)?;
        tx.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Connection for the next statement.
    pub(crate) async fn conn(&mut self) -> Result<Conn<'_, DB>> {
        match self.tx {
            Some(ref mut tx) => Ok(Conn::Tx(tx)),
            None => {
                let pool = self.connected()?;
                Ok(Conn::Pooled(pool.acquire().await?))
            }
        }
    }
}

impl<DB: Database> fmt::Debug for PoolHandle<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("driver", &self.driver)
            .field("state", &self.state)
            .field("in_transaction", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}
