//! Migration Runner - executes a plan against a live connection
//!
//! Steps run strictly in plan order on a single connection. Each step is
//! guarded by its precondition, and statement errors are turned into
//! [`ExecutionOutcome`] values through the [`ErrorClassifier`], so a run never
//! returns `Err`: everything that happens ends up in the [`MigrationResult`].

use std::time::Instant;

use idem_core::MigrateConfig;

use super::classifier::{ErrorClass, ErrorClassifier};
use super::definitions::{
    ExecutionOutcome, FailurePolicy, MigrationResult, RunStatus, SkipReason, StepOutcome,
    StepStatus, StepStatusReport,
};
use super::plan::MigrationPlan;
use super::splitter::StatementSplitter;
use super::step::MigrationStep;
use crate::backends::{DatabaseConnection, DatabasePool};
use crate::schema::SchemaProbe;

/// Runs migration plans
#[derive(Debug, Clone, Default)]
pub struct MigrationRunner {
    classifier: ErrorClassifier,
    policy: FailurePolicy,
}

impl MigrationRunner {
    /// Fail-fast runner with the default error rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner honoring the configured failure policy
    pub fn from_config(config: &MigrateConfig) -> Self {
        let policy = if config.continue_on_failure {
            FailurePolicy::ContinueOnFailure
        } else {
            FailurePolicy::FailFast
        };
        Self::new().with_policy(policy)
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Acquire one connection from `pool`, run the plan on it and release it
    pub async fn run(&self, plan: &MigrationPlan, pool: &dyn DatabasePool) -> MigrationResult {
        let start_time = Instant::now();

        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Could not acquire a database connection: {}", e);
                return MigrationResult::fatal(e.to_string(), start_time.elapsed().as_millis());
            }
        };

        let mut result = self.run_on(plan, &mut *conn).await;

        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to release database connection: {}", e);
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        result
    }

    /// Run the plan on an already acquired connection
    pub async fn run_on(
        &self,
        plan: &MigrationPlan,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrationResult {
        let start_time = Instant::now();
        let splitter =
            StatementSplitter::new(plan.split_mode()).for_dialect(conn.backend_type().dialect());

        tracing::info!(
            "Running {} migration steps on {} ({:?})",
            plan.len(),
            conn.backend_type(),
            self.policy
        );

        let mut outcomes = Vec::with_capacity(plan.len());
        let mut halted_by = None;

        for step in plan.steps() {
            tracing::info!("Migration step: {}", step.name());
            let outcome = self.apply_step(step, conn, &splitter).await;

            match &outcome.outcome {
                ExecutionOutcome::Applied => tracing::info!(
                    "Applied {} ({} statements)",
                    step.name(),
                    outcome.statements_executed
                ),
                ExecutionOutcome::SkippedAlreadyApplied { reason } => {
                    tracing::info!("Skipped {}: {}", step.name(), reason)
                }
                ExecutionOutcome::Failed { cause } => {
                    tracing::error!("Step {} failed: {}", step.name(), cause)
                }
            }

            let failed = match &outcome.outcome {
                ExecutionOutcome::Failed { cause } => Some(cause.clone()),
                _ => None,
            };
            outcomes.push(outcome);

            if let Some(cause) = failed {
                if self.policy == FailurePolicy::FailFast {
                    halted_by = Some(format!("step '{}' failed: {}", step.name(), cause));
                    break;
                }
            }
        }

        let failed_count = outcomes.iter().filter(|o| o.outcome.is_failed()).count();
        let (status, error) = match halted_by {
            Some(error) => {
                let remaining = plan.len() - outcomes.len();
                if remaining > 0 {
                    tracing::warn!("Run halted, {} steps not attempted", remaining);
                }
                (RunStatus::Fatal, Some(error))
            }
            None if failed_count > 0 => (
                RunStatus::PartialFailure,
                Some(format!("{} of {} steps failed", failed_count, plan.len())),
            ),
            None => (RunStatus::Success, None),
        };

        MigrationResult {
            outcomes,
            status,
            error,
            execution_time_ms: start_time.elapsed().as_millis(),
        }
    }

    /// Evaluate preconditions only; no statement is executed
    pub async fn dry_run(
        &self,
        plan: &MigrationPlan,
        conn: &mut dyn DatabaseConnection,
    ) -> Vec<StepStatusReport> {
        let mut probe = SchemaProbe::new(conn);
        let mut reports = Vec::with_capacity(plan.len());

        for step in plan.steps() {
            let status = match step.precondition().evaluate(&mut probe).await {
                Ok(true) => StepStatus::AlreadyApplied,
                Ok(false) => StepStatus::Pending,
                Err(e) => StepStatus::Unknown {
                    error: e.to_string(),
                },
            };
            reports.push(StepStatusReport {
                name: step.name().to_string(),
                check: step.precondition().describe(),
                status,
            });
        }

        reports
    }

    async fn apply_step(
        &self,
        step: &MigrationStep,
        conn: &mut dyn DatabaseConnection,
        splitter: &StatementSplitter,
    ) -> StepOutcome {
        let outcome = |outcome: ExecutionOutcome, statements_executed: usize| StepOutcome {
            name: step.name().to_string(),
            outcome,
            statements_executed,
        };
        let failed = |cause: String| outcome(ExecutionOutcome::Failed { cause }, 0);

        let already_applied = {
            let mut probe = SchemaProbe::new(&mut *conn);
            step.precondition().evaluate(&mut probe).await
        };
        match already_applied {
            Ok(true) => {
                return outcome(
                    ExecutionOutcome::SkippedAlreadyApplied {
                        reason: SkipReason::PreconditionMet {
                            check: step.precondition().describe(),
                        },
                    },
                    0,
                )
            }
            Ok(false) => {}
            Err(e) => return failed(format!("precondition check failed: {}", e)),
        }

        let statements = step.body().statements(splitter);
        if statements.is_empty() {
            tracing::warn!("Step {} has no statements", step.name());
        }

        let dialect = conn.backend_type().dialect();
        let use_transaction = step.is_transactional() && dialect.supports_transactional_ddl();
        if step.is_transactional() && !use_transaction {
            tracing::debug!(
                "{} commits DDL implicitly, running {} without a transaction",
                conn.backend_type(),
                step.name()
            );
        }

        if use_transaction {
            if let Err(e) = conn.execute("BEGIN", &[]).await {
                return failed(format!("could not begin transaction: {}", e));
            }
        }

        let mut executed = 0;
        for (index, statement) in statements.iter().enumerate() {
            tracing::debug!(
                "{} [{}/{}]: {}",
                step.name(),
                index + 1,
                statements.len(),
                statement
            );

            if use_transaction {
                if let Err(e) = conn.execute(SAVEPOINT, &[]).await {
                    rollback(conn, step).await;
                    return failed(format!("could not create savepoint: {}", e));
                }
            }

            let error = match conn.execute(statement, &[]).await {
                Ok(_) => {
                    executed += 1;
                    if use_transaction {
                        if let Err(e) = conn.execute(RELEASE_SAVEPOINT, &[]).await {
                            rollback(conn, step).await;
                            return failed(format!("could not release savepoint: {}", e));
                        }
                    }
                    continue;
                }
                Err(e) => e,
            };

            let class = self.classifier.classify_error(&error);
            if class != ErrorClass::AlreadyApplied {
                if use_transaction {
                    rollback(conn, step).await;
                    executed = 0;
                }
                return outcome(
                    ExecutionOutcome::Failed {
                        cause: format!("{} error in statement {}: {}", class, index + 1, error),
                    },
                    executed,
                );
            }

            // Keep the statements before the already applied one
            if use_transaction {
                let kept = match conn.execute(ROLLBACK_TO_SAVEPOINT, &[]).await {
                    Ok(_) => conn.execute("COMMIT", &[]).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = kept {
                    rollback(conn, step).await;
                    return failed(format!(
                        "could not keep statements before statement {}: {}",
                        index + 1,
                        e
                    ));
                }
            }

            return outcome(
                ExecutionOutcome::SkippedAlreadyApplied {
                    reason: SkipReason::AlreadyAppliedError {
                        statement_index: index,
                        error: error.to_string(),
                    },
                },
                executed,
            );
        }

        if use_transaction {
            if let Err(e) = conn.execute("COMMIT", &[]).await {
                rollback(conn, step).await;
                return failed(format!("commit failed: {}", e));
            }
        }

        outcome(ExecutionOutcome::Applied, executed)
    }
}

const SAVEPOINT: &str = "SAVEPOINT idem_statement";
const RELEASE_SAVEPOINT: &str = "RELEASE SAVEPOINT idem_statement";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT idem_statement";

async fn rollback(conn: &mut dyn DatabaseConnection, step: &MigrationStep) {
    if let Err(e) = conn.execute("ROLLBACK", &[]).await {
        tracing::warn!("Rollback of {} failed: {}", step.name(), e);
    }
}
