//! In-memory probe store.
//!
//! Mirrors the MySQL store's transaction semantics without a server: writes
//! are staged per transaction and only become visible on commit. Every
//! simulated connection checkout and return is counted, and individual steps
//! can be made to fail, so the probe's cleanup discipline can be observed.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::backend::{ProbePool, ProbeRecord, ProbeStore, ProbeTransaction, StoreError};

/// A step at which the memory store can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    Latest,
    Insert,
    /// The confirming read errors out
    Fetch,
    /// The confirming read succeeds but returns no rows
    FetchEmpty,
    Commit,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<ProbeRecord>,
    next_id: i64,
    acquired: u64,
    released: u64,
    ping_attempts: u32,
    failing_pings: u32,
    fail_at: Option<FailPoint>,
    fail_rollback: bool,
    closed: bool,
}

/// Snapshot of the store's connection accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub acquired: u64,
    pub released: u64,
}

/// In-memory probe store and pool.
#[derive(Clone, Default)]
pub struct MemoryProbeStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProbeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    /// Make the next `count` liveness checks fail.
    pub fn fail_pings(&self, count: u32) {
        self.lock().failing_pings = count;
    }

    /// Make every transaction fail at `point`.
    pub fn fail_at(&self, point: Option<FailPoint>) {
        self.lock().fail_at = point;
    }

    /// Make rollbacks report an error (the transaction is still discarded).
    pub fn fail_rollback(&self, fail: bool) {
        self.lock().fail_rollback = fail;
    }

    /// Insert a committed row directly.
    pub fn seed(&self, value: &str) -> ProbeRecord {
        let mut state = self.lock();
        state.next_id += 1;
        let record = ProbeRecord {
            id: state.next_id,
            value: value.to_string(),
            created_at: Utc::now(),
        };
        state.rows.push(record.clone());
        record
    }

    /// Committed rows.
    pub fn rows(&self) -> Vec<ProbeRecord> {
        self.lock().rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn connection_counts(&self) -> ConnectionCounts {
        let state = self.lock();
        ConnectionCounts {
            acquired: state.acquired,
            released: state.released,
        }
    }

    pub fn ping_attempts(&self) -> u32 {
        self.lock().ping_attempts
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Check out a simulated connection; it is returned when the guard drops.
    fn checkout(&self) -> Result<ConnectionGuard, StoreError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Unavailable("pool is closed".to_string()));
        }
        state.acquired += 1;
        Ok(ConnectionGuard {
            state: self.state.clone(),
        })
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ConnectionGuard {
    state: Arc<Mutex<MemoryState>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        lock_state(&self.state).released += 1;
    }
}

#[async_trait]
impl ProbePool for MemoryProbeStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _conn = self.checkout()?;
        let mut state = self.lock();
        state.ping_attempts += 1;
        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(StoreError::Unavailable("ECONNREFUSED".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}

#[async_trait]
impl ProbeStore for MemoryProbeStore {
    type Transaction = MemoryProbeTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        let conn = self.checkout()?;
        let tx = MemoryProbeTransaction {
            store: self.clone(),
            staged: Vec::new(),
            _conn: conn,
        };
        tx.check(FailPoint::Begin)?;
        Ok(tx)
    }
}

/// Transaction over the memory store. Staged rows are dropped unless committed.
pub struct MemoryProbeTransaction {
    store: MemoryProbeStore,
    staged: Vec<ProbeRecord>,
    _conn: ConnectionGuard,
}

impl MemoryProbeTransaction {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.store.lock().fail_at == Some(point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn visible(&self) -> Vec<ProbeRecord> {
        let mut rows = self.store.rows();
        rows.extend(self.staged.iter().cloned());
        rows
    }
}

#[async_trait]
impl ProbeTransaction for MemoryProbeTransaction {
    async fn latest(&mut self) -> Result<Option<ProbeRecord>, StoreError> {
        self.check(FailPoint::Latest)?;
        Ok(self
            .visible()
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))))
    }

    async fn insert(&mut self, value: &str) -> Result<i64, StoreError> {
        self.check(FailPoint::Insert)?;
        let id = {
            let mut state = self.store.lock();
            state.next_id += 1;
            state.next_id
        };
        self.staged.push(ProbeRecord {
            id,
            value: value.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn fetch(&mut self, id: i64) -> Result<Vec<ProbeRecord>, StoreError> {
        self.check(FailPoint::Fetch)?;
        if self.store.lock().fail_at == Some(FailPoint::FetchEmpty) {
            return Ok(Vec::new());
        }
        Ok(self.visible().into_iter().filter(|r| r.id == id).collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.check(FailPoint::Commit)?;
        self.store.lock().rows.extend(self.staged.iter().cloned());
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        if self.store.lock().fail_rollback {
            return Err(StoreError::Unavailable("injected rollback failure".to_string()));
        }
        Ok(())
    }
}
