//! Store abstraction used by the transactional probe.
//!
//! A store hands out transactions, each of which owns one pooled connection
//! for its whole lifetime. Dropping a transaction returns that connection to
//! the pool, so release happens exactly once on every exit path.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a store or pool implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// MySQL operation failed
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    /// No connection could be handed out without waiting
    #[error("Connection pool exhausted ({size} connections in use)")]
    PoolExhausted { size: u32 },

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Driver or server error code, for log fields.
    pub fn code(&self) -> String {
        match self {
            StoreError::MySql(sqlx::Error::Database(db)) => db
                .code()
                .map(|c| c.into_owned())
                .unwrap_or_else(|| "DATABASE_ERROR".to_string()),
            StoreError::MySql(sqlx::Error::Io(e)) => format!("{:?}", e.kind()),
            StoreError::MySql(sqlx::Error::PoolTimedOut) => "POOL_TIMED_OUT".to_string(),
            StoreError::MySql(sqlx::Error::PoolClosed) => "POOL_CLOSED".to_string(),
            StoreError::MySql(sqlx::Error::Tls(_)) => "TLS_ERROR".to_string(),
            StoreError::MySql(_) => "SQLX_ERROR".to_string(),
            StoreError::PoolExhausted { .. } => "POOL_EXHAUSTED".to_string(),
            StoreError::Unavailable(_) => "UNAVAILABLE".to_string(),
        }
    }
}

/// A row of the probe table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProbeRecord {
    pub id: i64,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// Progress of a probe transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Began,
    Read,
    Inserted,
    Confirmed,
    Committed,
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Idle => "idle",
            TxState::Began => "began",
            TxState::Read => "read",
            TxState::Inserted => "inserted",
            TxState::Confirmed => "confirmed",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// A pool that can be validated and shut down.
#[async_trait]
pub trait ProbePool: Send + Sync {
    /// Borrow one connection, issue a liveness check, and release it.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Close the pool and every idle connection in it.
    async fn close(&self);
}

/// Source of probe transactions.
#[async_trait]
pub trait ProbeStore: Send + Sync {
    type Transaction: ProbeTransaction;

    /// Acquire a pooled connection and open a transaction on it.
    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

/// An open transaction holding one pooled connection.
#[async_trait]
pub trait ProbeTransaction: Send {
    /// Most recent record by creation time.
    async fn latest(&mut self) -> Result<Option<ProbeRecord>, StoreError>;

    /// Insert a record with the given value and return its generated id.
    async fn insert(&mut self, value: &str) -> Result<i64, StoreError>;

    /// All records with the given id.
    async fn fetch(&mut self, id: i64) -> Result<Vec<ProbeRecord>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::MySql(sqlx::Error::PoolTimedOut).code(),
            "POOL_TIMED_OUT"
        );

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(StoreError::MySql(sqlx::Error::Io(io)).code(), "ConnectionRefused");

        let err = StoreError::PoolExhausted { size: 10 };
        assert_eq!(err.code(), "POOL_EXHAUSTED");
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(TxState::RolledBack.to_string(), "rolled back");
        assert_eq!(TxState::Confirmed.to_string(), "confirmed");
    }
}
