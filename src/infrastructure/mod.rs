//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `backoff`: Exponential backoff calculator
//! - `config`: Application configuration and settings
//! - `error`: Unified error types
//! - `mysql`: MySQL connection pool

pub mod backoff;
pub mod config;
pub mod error;
pub mod mysql;
