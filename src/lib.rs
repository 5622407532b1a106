// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::backoff;
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::mysql;

// Probe components
pub mod acquirer;
pub mod probe;

// Supporting modules
pub mod report;
pub mod telemetry;
