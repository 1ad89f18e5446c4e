use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Database URL validator
///
/// Only checks the scheme and that a host or path follows it; the driver
/// does the real parsing when the pool is created.
pub struct DatabaseUrlValidator {
    pub schemes: Vec<String>,
}

impl Default for DatabaseUrlValidator {
    fn default() -> Self {
        Self {
            schemes: vec![
                "postgres".to_string(),
                "postgresql".to_string(),
                "mysql".to_string(),
            ],
        }
    }
}

impl ConfigValidator<str> for DatabaseUrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                "non-empty database URL",
            ));
        }

        let rest = self
            .schemes
            .iter()
            .find_map(|scheme| value.strip_prefix(&format!("{}://", scheme)));

        match rest {
            Some(rest) if !rest.is_empty() => Ok(()),
            Some(_) => Err(ConfigError::invalid_value(
                "database_url",
                mask_database_url(value),
                "URL with host and database",
            )),
            None => Err(ConfigError::invalid_value(
                "database_url",
                mask_database_url(value),
                format!("URL with scheme: {}", self.schemes.join(", ")),
            )),
        }
    }
}

/// Log level validator
pub struct LogLevelValidator;

impl LogLevelValidator {
    pub const LEVELS: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];
}

impl ConfigValidator<str> for LogLevelValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if !Self::LEVELS.contains(&value) {
            return Err(ConfigError::invalid_value(
                "log_level",
                value,
                format!("one of: {}", Self::LEVELS.join(", ")),
            ));
        }
        Ok(())
    }
}

/// Hide the password part of a database URL before it is printed or logged
pub fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
        None => url.to_string(),
    }
}
