//! Migration System
//!
//! Forward-only, idempotent schema changes: a [`MigrationPlan`] of
//! precondition-guarded [`MigrationStep`]s executed by the [`MigrationRunner`].

pub mod classifier;
pub mod definitions;
pub mod plan;
pub mod runner;
pub mod splitter;
pub mod step;

pub use classifier::{ErrorClass, ErrorClassifier};
pub use definitions::{
    ExecutionOutcome, FailurePolicy, MigrationResult, RunStatus, SkipReason, StepOutcome,
    StepStatus, StepStatusReport,
};
pub use plan::MigrationPlan;
pub use runner::MigrationRunner;
pub use splitter::{split, SplitMode, StatementSplitter};
pub use step::{MigrationStep, Not, Precondition, PreconditionCheck, QueryReturnsRows, StepBody};
