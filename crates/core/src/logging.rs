//! # Structured Logging
//!
//! `tracing` subscriber setup for the command line front end.

use crate::config::{ConfigError, MigrateConfig};
use crate::error::CoreError;
use std::io;
use std::str::FromStr;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact single-line text
    Text,
    /// Multi-line human readable output
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid_value("log_format", s, "text, pretty, or json")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    pub format: LogFormat,
    /// Environment filter (supports directives like "idem_migrate=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Derive logging settings from the runner configuration.
    ///
    /// sqlx logs every statement at info; keep it at warn unless asked.
    pub fn from_config(config: &MigrateConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            env_filter: Some(format!("{},sqlx=warn", config.log_level)),
        }
    }

    fn filter_directives(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize the global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init_logging(config: &LoggingConfig) -> Result<(), CoreError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))
        .map_err(|e| CoreError::Logging {
            message: format!("invalid log filter '{}': {}", config.filter_directives(), e),
        })?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init(),
    };

    result.map_err(|e| CoreError::Logging {
        message: e.to_string(),
    })?;

    tracing::debug!(
        target: "idem::logging",
        "Logging initialized (level: {}, format: {:?})",
        config.level,
        config.format
    );

    Ok(())
}
