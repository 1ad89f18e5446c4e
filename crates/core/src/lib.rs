//! # idem-core
//!
//! Configuration, logging and error types shared by the idem migration
//! engine and its command line front end.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    mask_database_url, parse_table_list, AppConfigTrait, ConfigError, ConfigSource, Environment,
    MigrateConfig,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
