//! Postgres transaction source and pool setup.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Executor, Postgres};

use crate::transaction::{AccessMode, Transaction, TransactionSource};

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 100;

/// Default idle time after which a pooled connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default bound on opening and verifying a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Connection URL
    pub url: String,
    /// Maximum open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// Idle time before a connection is closed
    pub idle_timeout: Duration,
    /// Bound on acquiring and pinging a connection
    pub connect_timeout: Duration,
}

impl PoolSettings {
    /// Creates settings for `url` with the default limits.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of idle connections.
    #[must_use]
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the matching pool options.
    #[must_use]
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .idle_timeout(Some(self.idle_timeout))
            .acquire_timeout(self.connect_timeout)
    }
}

/// Opens a pool and verifies it with a ping.
///
/// The ping is bounded by the connect timeout; a pool that cannot reach the
/// database is closed before the error is returned.
pub async fn connect(settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let pool = settings.pool_options().connect_lazy(&settings.url)?;

    let ping = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    };
    if let Err(e) = ping.await {
        pool.close().await;
        return Err(e);
    }

    tracing::info!(
        max_connections = settings.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Opens transactions on a [`PgPool`].
#[derive(Debug, Clone)]
pub struct PgTransactionSource {
    pool: PgPool,
}

impl PgTransactionSource {
    /// Creates a source over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionSource for PgTransactionSource {
    type Tx = PgTransaction;

    async fn begin(&self, mode: AccessMode) -> Result<PgTransaction, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        (&mut *conn).execute(mode.begin_statement()).await?;
        Ok(PgTransaction { conn, open: true })
    }
}

/// A transaction on one pooled connection.
///
/// Dropping an unfinished transaction closes the connection instead of
/// returning it to the pool.
pub struct PgTransaction {
    conn: PoolConnection<Postgres>,
    open: bool,
}

impl PgTransaction {
    /// Returns the connection for running queries inside the transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Whether the transaction is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    async fn finish(&mut self, statement: &'static str) -> Result<(), sqlx::Error> {
        (&mut *self.conn).execute(statement).await?;
        self.open = false;
        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("transaction dropped while open, closing connection");
            self.conn.close_on_drop();
        }
    }
}
