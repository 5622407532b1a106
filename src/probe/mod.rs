//! Transactional connectivity probe.
//!
//! - `backend`: store/transaction traits and shared types
//! - `mysql_backend`: MySQL store over the shared pool
//! - `memory_backend`: in-process store with failure injection
//! - `prober`: the read, insert, confirm, commit sequence

pub mod backend;
pub mod memory_backend;
pub mod mysql_backend;
pub mod prober;

pub use backend::{ProbePool, ProbeRecord, ProbeStore, ProbeTransaction, StoreError, TxState};
pub use memory_backend::{ConnectionCounts, FailPoint, MemoryProbeStore};
pub use mysql_backend::MySqlProbeStore;
pub use prober::{ProbeOutcome, TransactionalProber};
