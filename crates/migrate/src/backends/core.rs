//! Core Database Backend Traits
//!
//! This module defines the connection-provider contract the migration runner
//! depends on. Drivers hide behind these traits so the runner and the schema
//! probe can be exercised against any backend (or an in-memory double).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};

use super::DatabaseBackendType;
use crate::error::{MigrateError, MigrateResult};

/// Abstract database connection trait
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Backend this connection talks to
    fn backend_type(&self) -> DatabaseBackendType;

    /// Execute a statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Execute a query and return the result rows
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Option<Box<dyn DatabaseRow>>>;

    /// Release the connection. Pooled connections go back to their pool.
    async fn close(&mut self) -> MigrateResult<()>;
}

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Backend the pooled connections talk to
    fn backend_type(&self) -> DatabaseBackendType;

    /// Acquire a connection from the pool
    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>>;

    /// Close the pool
    async fn close(&self) -> MigrateResult<()>;
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Textual form of the value, `None` for NULL.
    ///
    /// Byte strings are decoded lossily: MySQL reports several
    /// information_schema columns with a binary collation.
    pub fn as_text(&self) -> Option<String> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(b.to_string()),
            DatabaseValue::Int32(i) => Some(i.to_string()),
            DatabaseValue::Int64(i) => Some(i.to_string()),
            DatabaseValue::Float64(f) => Some(f.to_string()),
            DatabaseValue::String(s) => Some(s.clone()),
            DatabaseValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            DatabaseValue::DateTime(dt) => Some(dt.to_rfc3339()),
            DatabaseValue::Date(d) => Some(d.to_string()),
            DatabaseValue::Time(t) => Some(t.to_string()),
            DatabaseValue::Json(j) => Some(j.to_string()),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
        }
    }

    /// Quote a possibly schema-qualified identifier (`schema.table`)
    pub fn quote_identifier(&self, name: &str) -> MigrateResult<String> {
        if name.trim().is_empty() || name.contains('\0') {
            return Err(MigrateError::Schema(format!(
                "invalid identifier '{}'",
                name.escape_default()
            )));
        }

        let quote = self.identifier_quote();
        let doubled = format!("{}{}", quote, quote);
        let parts: Vec<String> = name
            .split('.')
            .map(|part| {
                format!(
                    "{}{}{}",
                    quote,
                    part.replace(quote, &doubled),
                    quote
                )
            })
            .collect();
        Ok(parts.join("."))
    }

    /// Whether DDL statements can be rolled back inside a transaction.
    ///
    /// MySQL commits implicitly around every DDL statement.
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL => true,
            SqlDialect::MySQL => false,
        }
    }

    /// Tokenizer dialect used by the quote-aware statement splitter
    pub fn tokenizer_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
            SqlDialect::MySQL => Box::new(MySqlDialect {}),
        }
    }
}

/// Tokenizer dialect for SQL whose backend is not known yet
pub(crate) fn generic_tokenizer_dialect() -> Box<dyn Dialect> {
    Box::new(GenericDialect {})
}

/// Database backend trait that provides database-specific implementations
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Create a connection pool from a database URL
    async fn create_pool(
        &self,
        database_url: &str,
        config: DatabasePoolConfig,
    ) -> MigrateResult<Arc<dyn DatabasePool>>;

    /// Get the backend type
    fn backend_type(&self) -> DatabaseBackendType;

    /// Validate a database URL for this backend
    fn validate_database_url(&self, url: &str) -> MigrateResult<()>;
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 2,
            min_connections: 0,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(60),
            test_before_acquire: true,
        }
    }
}

impl DatabasePoolConfig {
    /// Pool settings for a runner configuration
    pub fn from_config(config: &idem_core::MigrateConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout_seconds: config.acquire_timeout,
            ..Self::default()
        }
    }
}

/// Database backend registry for managing multiple backend implementations
pub struct DatabaseBackendRegistry {
    backends: HashMap<DatabaseBackendType, Arc<dyn DatabaseBackend>>,
}

impl DatabaseBackendRegistry {
    /// Create an empty backend registry
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry with the PostgreSQL and MySQL backends installed
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            DatabaseBackendType::PostgreSQL,
            Arc::new(super::PostgresBackend::new()),
        );
        registry.register(DatabaseBackendType::MySQL, Arc::new(super::MySqlBackend::new()));
        registry
    }

    /// Register a database backend
    pub fn register(&mut self, backend_type: DatabaseBackendType, backend: Arc<dyn DatabaseBackend>) {
        self.backends.insert(backend_type, backend);
    }

    /// Get a database backend by type
    pub fn get(&self, backend_type: &DatabaseBackendType) -> Option<Arc<dyn DatabaseBackend>> {
        self.backends.get(backend_type).cloned()
    }

    /// Create a connection pool using the appropriate backend for the given URL
    pub async fn create_pool(
        &self,
        database_url: &str,
        config: DatabasePoolConfig,
    ) -> MigrateResult<Arc<dyn DatabasePool>> {
        let backend_type = Self::detect_backend_from_url(database_url)?;
        let backend = self.get(&backend_type).ok_or_else(|| {
            MigrateError::Configuration(format!("No backend registered for {}", backend_type))
        })?;

        backend.validate_database_url(database_url)?;
        backend.create_pool(database_url, config).await
    }

    /// Detect database backend type from URL
    pub fn detect_backend_from_url(url: &str) -> MigrateResult<DatabaseBackendType> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("mysql://") {
            Ok(DatabaseBackendType::MySQL)
        } else {
            Err(MigrateError::Configuration(format!(
                "Unable to detect database backend from URL: {}",
                idem_core::mask_database_url(url)
            )))
        }
    }

    /// List all registered backend types
    pub fn registered_backends(&self) -> Vec<DatabaseBackendType> {
        let mut types: Vec<_> = self.backends.keys().copied().collect();
        types.sort();
        types
    }
}

impl Default for DatabaseBackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse and sanity check a database URL for the given schemes
pub(crate) fn validate_url_scheme(
    url: &str,
    schemes: &[&str],
    backend: DatabaseBackendType,
) -> MigrateResult<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| MigrateError::Configuration(format!("Invalid database URL: {}", e)))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(MigrateError::Configuration(format!(
            "Invalid {} URL scheme '{}'",
            backend,
            parsed.scheme()
        )));
    }

    if parsed.path().trim_start_matches('/').is_empty() {
        return Err(MigrateError::Configuration(
            "Missing database name in URL".to_string(),
        ));
    }

    Ok(())
}
