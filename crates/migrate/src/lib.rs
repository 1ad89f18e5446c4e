//! # idem-migrate
//!
//! Idempotent schema migrations for PostgreSQL and MySQL.
//!
//! A [`MigrationPlan`] is an ordered list of named steps. Before a step runs,
//! its precondition is checked against the live schema; if the change is
//! already there, nothing is executed. Statement errors that mean "already
//! applied" (duplicate column, table exists, ...) are classified as skips, so
//! running the same plan twice is safe.
//!
//! ```ignore
//! use idem_migrate::{DatabaseBackendRegistry, DatabasePoolConfig, MigrationPlan,
//!     MigrationRunner, MigrationStep, PreconditionCheck};
//!
//! let plan = MigrationPlan::new(vec![
//!     MigrationStep::new("add_users_nickname")
//!         .skip_if(PreconditionCheck::column_exists("users", "nickname"))
//!         .sql("ALTER TABLE users ADD COLUMN nickname VARCHAR(64);"),
//! ])?;
//!
//! let pool = DatabaseBackendRegistry::with_defaults()
//!     .create_pool(&database_url, DatabasePoolConfig::default())
//!     .await?;
//! let result = MigrationRunner::new().run(&plan, pool.as_ref()).await;
//! ```

pub mod backends;
pub mod error;
pub mod migrations;
pub mod schema;

#[cfg(test)]
mod testing;

pub use backends::{
    DatabaseBackend, DatabaseBackendRegistry, DatabaseBackendType, DatabaseConnection,
    DatabasePool, DatabasePoolConfig, DatabaseRow, DatabaseValue, MySqlBackend, PostgresBackend,
    SqlDialect,
};
pub use error::{DatabaseError, MigrateError, MigrateResult};
pub use migrations::{
    ErrorClass, ErrorClassifier, ExecutionOutcome, FailurePolicy, MigrationPlan, MigrationResult,
    MigrationRunner, MigrationStep, Precondition, PreconditionCheck, RunStatus, SkipReason,
    SplitMode, StatementSplitter, StepOutcome, StepStatus, StepStatusReport,
};
pub use schema::{ColumnInfo, SchemaDump, SchemaProbe};
