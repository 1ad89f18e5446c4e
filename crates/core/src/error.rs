use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for idem tooling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
