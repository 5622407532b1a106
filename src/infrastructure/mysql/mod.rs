//! MySQL connectivity module.
//!
//! Provides the lazily-connected pool the acquirer validates and the probe
//! borrows connections from.

pub mod pool;

pub use pool::MySqlProbePool;
