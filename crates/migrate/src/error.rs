//! Error types for the migration engine
//!
//! Driver errors keep their backend and vendor code so the
//! [`ErrorClassifier`](crate::migrations::ErrorClassifier) can decide whether
//! a failed statement means "already applied" or a real failure.

use std::fmt;

use crate::backends::DatabaseBackendType;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error reported by the database server for a statement or query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// Backend that produced the error, when known
    pub backend: Option<DatabaseBackendType>,
    /// Vendor error code: the MySQL error number or the PostgreSQL SQLSTATE
    pub code: Option<String>,
    pub message: String,
}

impl DatabaseError {
    pub fn new(
        backend: Option<DatabaseBackendType>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error types for migration operations
#[derive(Debug, Clone)]
pub enum MigrateError {
    /// The server rejected a statement or query
    Database(DatabaseError),
    /// Connection pool or connection error
    Connection(String),
    /// A result row could not be decoded
    Query(String),
    /// Schema inspection failed (e.g. the table does not exist)
    Schema(String),
    /// The migration plan is invalid
    Plan(String),
    /// Unsupported configuration or backend
    Configuration(String),
    /// File system error while reading plans or writing dumps
    Io(String),
}

impl MigrateError {
    /// The database error payload, if this error came from the server
    pub fn database_error(&self) -> Option<&DatabaseError> {
        match self {
            MigrateError::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::Database(err) => write!(f, "Database error: {}", err),
            MigrateError::Connection(msg) => write!(f, "Connection error: {}", msg),
            MigrateError::Query(msg) => write!(f, "Query error: {}", msg),
            MigrateError::Schema(msg) => write!(f, "Schema error: {}", msg),
            MigrateError::Plan(msg) => write!(f, "Plan error: {}", msg),
            MigrateError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            MigrateError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for MigrateError {}

impl From<DatabaseError> for MigrateError {
    fn from(err: DatabaseError) -> Self {
        MigrateError::Database(err)
    }
}

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        MigrateError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::Plan(format!("invalid plan file: {}", err))
    }
}

/// Convert a sqlx error, keeping the vendor code of server-side errors.
///
/// MySQL errors are identified by their numeric code (1060, 1061, ...),
/// which sqlx only exposes on the concrete `MySqlDatabaseError`.
pub(crate) fn from_sqlx(backend: DatabaseBackendType, err: sqlx::Error) -> MigrateError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = match backend {
                DatabaseBackendType::MySQL => db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|mysql_err| mysql_err.number().to_string())
                    .or_else(|| db_err.code().map(|c| c.into_owned())),
                DatabaseBackendType::PostgreSQL => db_err.code().map(|c| c.into_owned()),
            };
            MigrateError::Database(DatabaseError::new(
                Some(backend),
                code,
                db_err.message().to_string(),
            ))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            MigrateError::Connection(err.to_string())
        }
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => MigrateError::Query(err.to_string()),
        other => MigrateError::Database(DatabaseError::new(Some(backend), None, other.to_string())),
    }
}
