use thiserror::Error;

use crate::probe::TxState;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Missing required environment variable: {0}")]
    MissingConfiguration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("Database connection failed: exceeded maximum retry attempts ({max_attempts})")]
    Connection { max_attempts: u32 },

    #[error("Transaction failed (last state: {stage}): {message}")]
    Transaction { stage: TxState, message: String },
}

impl ProbeError {
    /// Short code used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::MissingConfiguration(_) => "MISSING_CONFIGURATION",
            ProbeError::Config(_) => "CONFIG_ERROR",
            ProbeError::InvalidTable(_) => "INVALID_TABLE",
            ProbeError::Connection { .. } => "CONNECTION_ERROR",
            ProbeError::Transaction { .. } => "TRANSACTION_ERROR",
        }
    }

    /// Whether this error was raised before any connection attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProbeError::MissingConfiguration(_) | ProbeError::Config(_) | ProbeError::InvalidTable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
