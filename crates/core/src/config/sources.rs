use std::fmt;

/// Origin of a configuration value, reported by `config_sources()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from the named environment variable (or `.env`)
    EnvVar(String),
    /// Built-in default, rendered for display
    Default(String),
    /// Overridden by the named command line flag
    CommandLine(String),
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "${}", var),
            ConfigSource::Default(value) => write!(f, "default ({})", value),
            ConfigSource::CommandLine(flag) => write!(f, "flag {}", flag),
        }
    }
}
