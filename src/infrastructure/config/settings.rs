use std::collections::HashMap;
use std::env;
use std::fmt;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ProbeError, Result};

/// Environment variables that must be present (and non-empty) before any
/// connection attempt is made.
pub const REQUIRED_ENV_VARS: [&str; 4] = ["MYSQL_HOST", "MYSQL_USER", "MYSQL_PASSWORD", "MYSQL_DB"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Pool configuration. Immutable once loaded.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(rename = "db")]
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of pooled connections
    #[serde(default = "default_connection_limit")]
    pub connection_limit: u32,
    /// Wait for a free connection when the pool is exhausted instead of failing immediately
    #[serde(default = "default_wait_for_connections")]
    pub wait_for_connections: bool,
    /// Upper bound on how long a caller waits for a pooled connection
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    /// Table the probe reads from and inserts into
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_port() -> u16 {
    3306
}

fn default_connection_limit() -> u32 {
    10
}

fn default_wait_for_connections() -> bool {
    true
}

fn default_acquire_timeout_seconds() -> u64 {
    10
}

fn default_table() -> String {
    "test_table".to_string()
}

impl Settings {
    /// Load settings from `.env`, optional config files and the process environment.
    pub fn new() -> Result<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load settings from an explicit set of variables.
    ///
    /// Required variables are checked first so a missing one is reported by
    /// name rather than as a deserialization failure.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        for name in REQUIRED_ENV_VARS {
            match vars.get(name) {
                Some(value) if !value.is_empty() => {}
                _ => return Err(ProbeError::MissingConfiguration(name.to_string())),
            }
        }

        let run_mode = vars
            .get("RUN_MODE")
            .cloned()
            .unwrap_or_else(|| "development".into());

        let config = Config::builder()
            .set_default("port", i64::from(default_port()))?
            .set_default("connection_limit", i64::from(default_connection_limit()))?
            .set_default("wait_for_connections", default_wait_for_connections())?
            .set_default(
                "acquire_timeout_seconds",
                default_acquire_timeout_seconds() as i64,
            )?
            .set_default("table", default_table())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // MYSQL_HOST, MYSQL_PORT, MYSQL_CONNECTION_LIMIT, ...
            .add_source(Environment::with_prefix("MYSQL").source(Some(vars.clone())))
            // LOG_FORMAT
            .add_source(Environment::with_prefix("LOG").source(Some(vars.clone())))
            .build()?;

        let database: DatabaseConfig = config.clone().try_deserialize()?;
        validate_table_name(&database.table)?;
        let logging: LoggingConfig = config.try_deserialize()?;

        Ok(Self { database, logging })
    }
}

impl DatabaseConfig {
    /// `user@host:port/database`, safe to log.
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("port", &self.port)
            .field("connection_limit", &self.connection_limit)
            .field("wait_for_connections", &self.wait_for_connections)
            .field("acquire_timeout_seconds", &self.acquire_timeout_seconds)
            .field("table", &self.table)
            .finish()
    }
}

/// Table names are spliced into SQL text, so only plain identifiers are accepted.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid && name.len() <= 64 {
        Ok(())
    } else {
        Err(ProbeError::InvalidTable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_vars() -> HashMap<String, String> {
        [
            ("MYSQL_HOST", "db.internal"),
            ("MYSQL_USER", "probe"),
            ("MYSQL_PASSWORD", "0123secret"),
            ("MYSQL_DB", "smoke"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_vars(&required_vars()).unwrap();
        let db = &settings.database;
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.user, "probe");
        assert_eq!(db.password, "0123secret");
        assert_eq!(db.database, "smoke");
        assert_eq!(db.port, 3306);
        assert_eq!(db.connection_limit, 10);
        assert!(db.wait_for_connections);
        assert_eq!(db.table, "test_table");
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = required_vars();
        vars.insert("MYSQL_PORT".to_string(), "3307".to_string());
        vars.insert("MYSQL_CONNECTION_LIMIT".to_string(), "4".to_string());
        vars.insert("MYSQL_WAIT_FOR_CONNECTIONS".to_string(), "false".to_string());
        vars.insert("LOG_FORMAT".to_string(), "json".to_string());

        let settings = Settings::from_vars(&vars).unwrap();
        assert_eq!(settings.database.port, 3307);
        assert_eq!(settings.database.connection_limit, 4);
        assert!(!settings.database.wait_for_connections);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_each_missing_variable_is_named() {
        for name in REQUIRED_ENV_VARS {
            let mut vars = required_vars();
            vars.remove(name);
            match Settings::from_vars(&vars) {
                Err(ProbeError::MissingConfiguration(missing)) => assert_eq!(missing, name),
                other => panic!("expected missing {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_variable_counts_as_missing() {
        let mut vars = required_vars();
        vars.insert("MYSQL_PASSWORD".to_string(), String::new());
        assert!(matches!(
            Settings::from_vars(&vars),
            Err(ProbeError::MissingConfiguration(name)) if name == "MYSQL_PASSWORD"
        ));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let mut vars = required_vars();
        vars.insert("MYSQL_TABLE".to_string(), "t; DROP TABLE users".to_string());
        assert!(matches!(
            Settings::from_vars(&vars),
            Err(ProbeError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("test_table").is_ok());
        assert!(validate_table_name("_probe2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("a-b").is_err());
        assert!(validate_table_name("a`b").is_err());
    }

    #[test]
    fn test_debug_masks_password() {
        let settings = Settings::from_vars(&required_vars()).unwrap();
        let debug = format!("{:?}", settings.database);
        assert!(!debug.contains("0123secret"));
        assert_eq!(settings.database.target(), "probe@db.internal:3306/smoke");
    }
}
