//! Migration Definitions - outcome and result types reported by the runner

use std::fmt;

use serde::Serialize;

/// Why a step did not run (or stopped running) without failing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The precondition reported the change as present; nothing was executed
    PreconditionMet { check: String },
    /// A statement failed with an "already applied" error
    AlreadyAppliedError { statement_index: usize, error: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PreconditionMet { check } => write!(f, "precondition met ({})", check),
            SkipReason::AlreadyAppliedError {
                statement_index,
                error,
            } => write!(
                f,
                "statement {} reported already applied: {}",
                statement_index + 1,
                error
            ),
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Applied,
    SkippedAlreadyApplied { reason: SkipReason },
    Failed { cause: String },
}

impl ExecutionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ExecutionOutcome::SkippedAlreadyApplied { .. })
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Applied => write!(f, "applied"),
            ExecutionOutcome::SkippedAlreadyApplied { reason } => write!(f, "skipped: {}", reason),
            ExecutionOutcome::Failed { cause } => write!(f, "FAILED: {}", cause),
        }
    }
}

/// Outcome of a named step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
    /// Statements that completed and were kept (0 after a rollback)
    pub statements_executed: usize,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step was applied or skipped
    Success,
    /// Some steps failed; the remaining steps still ran
    PartialFailure,
    /// The run halted on a failure, or never started
    Fatal,
}

impl RunStatus {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Fatal => 1,
            RunStatus::PartialFailure => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::PartialFailure => write!(f, "partial failure"),
            RunStatus::Fatal => write!(f, "fatal"),
        }
    }
}

/// Result of running a migration plan
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub outcomes: Vec<StepOutcome>,
    pub status: RunStatus,
    pub error: Option<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationResult {
    /// Result of a run that could not start
    pub fn fatal(error: impl Into<String>, execution_time_ms: u128) -> Self {
        Self {
            outcomes: Vec::new(),
            status: RunStatus::Fatal,
            error: Some(error.into()),
            execution_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn outcome(&self, name: &str) -> Option<&ExecutionOutcome> {
        self.outcomes
            .iter()
            .find(|step| step.name == name)
            .map(|step| &step.outcome)
    }

    pub fn applied_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, ExecutionOutcome::Applied))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ExecutionOutcome::is_skipped)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ExecutionOutcome::is_failed)
    }

    fn count(&self, predicate: impl Fn(&ExecutionOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|step| predicate(&step.outcome))
            .count()
    }
}

/// What the runner does after a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed step
    #[default]
    FailFast,
    /// Record the failure and run the remaining steps
    ContinueOnFailure,
}

/// Precondition-only view of a step, reported by a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    AlreadyApplied,
    /// The precondition could not be evaluated
    Unknown { error: String },
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::AlreadyApplied => write!(f, "already applied"),
            StepStatus::Unknown { error } => write!(f, "unknown ({})", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatusReport {
    pub name: String,
    pub check: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, outcome: ExecutionOutcome) -> StepOutcome {
        StepOutcome {
            name: name.to_string(),
            outcome,
            statements_executed: 0,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::Fatal.exit_code(), 1);
        assert_eq!(RunStatus::PartialFailure.exit_code(), 2);
    }

    #[test]
    fn test_result_counts() {
        let result = MigrationResult {
            outcomes: vec![
                step("a", ExecutionOutcome::Applied),
                step(
                    "b",
                    ExecutionOutcome::SkippedAlreadyApplied {
                        reason: SkipReason::PreconditionMet {
                            check: "column users.age exists".to_string(),
                        },
                    },
                ),
                step(
                    "c",
                    ExecutionOutcome::Failed {
                        cause: "boom".to_string(),
                    },
                ),
            ],
            status: RunStatus::PartialFailure,
            error: None,
            execution_time_ms: 3,
        };

        assert_eq!(result.applied_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(!result.is_success());
        assert_eq!(result.outcome("a"), Some(&ExecutionOutcome::Applied));
        assert!(result.outcome("zzz").is_none());
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let json = serde_json::to_value(step(
            "add_age",
            ExecutionOutcome::Failed {
                cause: "fatal error".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(json["name"], "add_age");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["cause"], "fatal error");
    }
}
