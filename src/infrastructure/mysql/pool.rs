//! MySQL connection pool used by the connectivity probe.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Transaction};

use crate::config::DatabaseConfig;
use crate::probe::{ProbePool, StoreError};

/// MySQL connection pool with a non-waiting acquisition mode.
///
/// The pool is created lazily: no socket is opened until the first
/// acquisition, so constructing it never fails and it can be reused across
/// liveness retries.
#[derive(Clone)]
pub struct MySqlProbePool {
    /// The underlying connection pool
    pool: MySqlPool,

    /// Options the pool opens connections with; liveness checks reuse them
    options: MySqlConnectOptions,

    /// `user@host:port/database` (for logging purposes)
    target: String,

    /// Queue for a free connection instead of failing when the pool is full
    wait_for_connections: bool,

    max_connections: u32,
}

impl MySqlProbePool {
    /// Create a new MySQL pool from configuration.
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.connection_limit)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_lazy_with(options.clone());

        tracing::info!(
            db = %config.target(),
            connection_limit = config.connection_limit,
            wait_for_connections = config.wait_for_connections,
            "MySQL connection pool created"
        );

        Self {
            pool,
            options,
            target: config.target(),
            wait_for_connections: config.wait_for_connections,
            max_connections: config.connection_limit,
        }
    }

    /// Connection target, without the password.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Acquire a connection and open a transaction on it.
    ///
    /// The returned transaction owns the connection; dropping it rolls back
    /// anything uncommitted and releases the connection.
    pub async fn begin(&self) -> Result<Transaction<'static, MySql>, StoreError> {
        self.ensure_available()?;
        Ok(self.pool.begin().await?)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if !self.wait_for_connections
            && self.pool.num_idle() == 0
            && self.pool.size() >= self.max_connections
        {
            return Err(StoreError::PoolExhausted {
                size: self.pool.size(),
            });
        }
        Ok(())
    }

    /// Close the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(db = %self.target, "MySQL connection pool closed");
    }
}

#[async_trait]
impl ProbePool for MySqlProbePool {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(sqlx::Error::PoolClosed.into());
        }

        if self.pool.num_idle() > 0 {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            return Ok(());
        }

        // Pool::acquire keeps retrying refused connects until the acquire
        // timeout; a direct connect reports the first failure as it is.
        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        conn.ping().await?;
        conn.close().await?;
        Ok(())
    }

    async fn close(&self) {
        MySqlProbePool::close(self).await;
    }
}
