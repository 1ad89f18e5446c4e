use crate::config::{
    ConfigError, ConfigSource, ConfigValidator, DatabaseUrlValidator, LogLevelValidator,
};
use crate::logging::LogFormat;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Deployment environment, from `IDEM_ENV` or `ENVIRONMENT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::invalid_value(
                "environment",
                s,
                "development, testing, or production",
            )),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }

    /// Production runs log a warning before touching the schema
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// (field, environment variable, default shown in source reports)
const ENV_KEYS: [(&str, &str, &str); 9] = [
    ("environment", "IDEM_ENV", "development"),
    ("database_url", "DATABASE_URL", "unset"),
    ("log_level", "LOG_LEVEL", "info"),
    ("log_format", "IDEM_LOG_FORMAT", "text"),
    ("max_connections", "IDEM_MAX_CONNECTIONS", "2"),
    ("acquire_timeout", "IDEM_ACQUIRE_TIMEOUT", "30"),
    ("continue_on_failure", "IDEM_CONTINUE_ON_FAILURE", "false"),
    ("dump_tables", "IDEM_DUMP_TABLES", "none"),
    ("dump_output", "IDEM_DUMP_OUTPUT", "schema_dump.sql"),
];

/// Runtime configuration of the migration runner and its CLI
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Upper bound for the pool; a run only ever holds one connection
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout: u64,
    pub continue_on_failure: bool,
    pub dump_tables: Vec<String>,
    pub dump_output: PathBuf,
}

impl MigrateConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            environment: Environment::Development,
            database_url: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            max_connections: 2,
            acquire_timeout: 30,
            continue_on_failure: false,
            dump_tables: Vec::new(),
            dump_output: PathBuf::from("schema_dump.sql"),
        }
    }

    /// Create configuration for tests (quiet logging, no database)
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            log_level: "warn".to_string(),
            ..Self::new()
        }
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// `from_env` passes `std::env::var`; tests pass a map.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(env_str) = lookup("IDEM_ENV").or_else(|| lookup("ENVIRONMENT")) {
            config.environment = env_str.parse()?;
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        if let Some(format) = lookup("IDEM_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        if let Some(value) = lookup("IDEM_MAX_CONNECTIONS") {
            config.max_connections = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value("max_connections", &value, "positive integer")
            })?;
        }

        if let Some(value) = lookup("IDEM_ACQUIRE_TIMEOUT") {
            config.acquire_timeout = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value("acquire_timeout", &value, "number of seconds")
            })?;
        }

        if let Some(value) = lookup("IDEM_CONTINUE_ON_FAILURE") {
            config.continue_on_failure = parse_bool("continue_on_failure", &value)?;
        }

        if let Some(value) = lookup("IDEM_DUMP_TABLES") {
            config.dump_tables = parse_table_list(&value);
        }

        if let Some(value) = lookup("IDEM_DUMP_OUTPUT") {
            config.dump_output = PathBuf::from(value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Database URL, or an error explaining how to provide one
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or_else(|| {
            ConfigError::missing_required(
                "database_url",
                "Set DATABASE_URL (or pass --database-url)",
            )
        })
    }
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfigTrait for MigrateConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        LogLevelValidator.validate(self.log_level.as_str())?;

        if let Some(url) = &self.database_url {
            DatabaseUrlValidator::default().validate(url.as_str())?;
        }

        if self.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "max_connections",
                "0",
                "at least 1 connection",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        ENV_KEYS
            .iter()
            .map(|(field, var, default)| {
                let source = if env::var(var).is_ok() {
                    ConfigSource::EnvVar(var.to_string())
                } else {
                    ConfigSource::Default(default.to_string())
                };
                (field.to_string(), source)
            })
            .collect()
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid_value(field, value, "true or false")),
    }
}

/// Split a comma separated table list, dropping blanks
pub fn parse_table_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
