//! Database Backend Abstractions
//!
//! The runner only talks to [`DatabasePool`] and [`DatabaseConnection`];
//! PostgreSQL and MySQL implementations are provided on top of sqlx.

pub mod core;
pub mod mysql;
pub mod postgres;

pub use self::core::*;
pub use mysql::MySqlBackend;
pub use postgres::PostgresBackend;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatabaseBackendType {
    PostgreSQL,
    MySQL,
}

impl DatabaseBackendType {
    /// SQL dialect spoken by this backend
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL => SqlDialect::PostgreSQL,
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::MySQL => write!(f, "mysql"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySQL),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
