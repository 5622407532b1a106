mod settings;

pub use settings::{
    validate_table_name, DatabaseConfig, LogFormat, LoggingConfig, Settings, REQUIRED_ENV_VARS,
};
