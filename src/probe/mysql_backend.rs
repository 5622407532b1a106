//! MySQL-backed probe store.
//!
//! Every statement runs inside a single transaction on one pooled connection.
//! The table name is validated at configuration time; the inserted value is
//! always bound as a parameter.

use async_trait::async_trait;
use sqlx::mysql::MySql;
use sqlx::Transaction;

use crate::config::validate_table_name;
use crate::error::Result;
use crate::mysql::MySqlProbePool;

use super::backend::{ProbeRecord, ProbeStore, ProbeTransaction, StoreError};

/// Probe store that reads from and inserts into a MySQL table.
///
/// Expected table shape:
/// - `id` - auto-increment primary key
/// - `value` - text column
/// - `created_at` - `TIMESTAMP`/`DATETIME` defaulting to the insert time
pub struct MySqlProbeStore {
    pool: MySqlProbePool,
    queries: Queries,
}

#[derive(Clone)]
struct Queries {
    latest: String,
    insert: String,
    fetch: String,
}

impl Queries {
    fn for_table(table: &str) -> Self {
        Self {
            latest: format!(
                "SELECT CAST(id AS SIGNED) AS id, `value`, created_at FROM `{table}` \
                 ORDER BY created_at DESC LIMIT 1"
            ),
            insert: format!("INSERT INTO `{table}` (`value`) VALUES (?)"),
            fetch: format!(
                "SELECT CAST(id AS SIGNED) AS id, `value`, created_at FROM `{table}` WHERE id = ?"
            ),
        }
    }
}

impl MySqlProbeStore {
    /// Create a store over `table`, which must be a plain identifier.
    pub fn new(pool: MySqlProbePool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            queries: Queries::for_table(table),
        })
    }
}

#[async_trait]
impl ProbeStore for MySqlProbeStore {
    type Transaction = MySqlProbeTransaction;

    async fn begin(&self) -> std::result::Result<Self::Transaction, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(MySqlProbeTransaction {
            tx,
            queries: self.queries.clone(),
        })
    }
}

/// Open MySQL transaction; owns its pooled connection until dropped.
pub struct MySqlProbeTransaction {
    tx: Transaction<'static, MySql>,
    queries: Queries,
}

#[async_trait]
impl ProbeTransaction for MySqlProbeTransaction {
    async fn latest(&mut self) -> std::result::Result<Option<ProbeRecord>, StoreError> {
        let record = sqlx::query_as::<_, ProbeRecord>(&self.queries.latest)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(record)
    }

    async fn insert(&mut self, value: &str) -> std::result::Result<i64, StoreError> {
        let result = sqlx::query(&self.queries.insert)
            .bind(value)
            .execute(&mut *self.tx)
            .await?;

        i64::try_from(result.last_insert_id()).map_err(|_| {
            StoreError::Unavailable(format!(
                "generated id {} does not fit a signed 64-bit integer",
                result.last_insert_id()
            ))
        })
    }

    async fn fetch(&mut self, id: i64) -> std::result::Result<Vec<ProbeRecord>, StoreError> {
        let records = sqlx::query_as::<_, ProbeRecord>(&self.queries.fetch)
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(records)
    }

    async fn commit(self) -> std::result::Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> std::result::Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
