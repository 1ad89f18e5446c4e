use std::path::Path;

use idem_core::MigrateConfig;
use idem_migrate::{
    ExecutionOutcome, MigrationResult, MigrationRunner, RunStatus, SplitMode, StepOutcome,
    StepStatus, StepStatusReport,
};

use super::{connect, load_plan};

pub async fn run(
    config: &MigrateConfig,
    plan_path: Option<&Path>,
    split_mode: Option<SplitMode>,
    json: bool,
) -> anyhow::Result<RunStatus> {
    let plan = load_plan(plan_path, split_mode)?;
    let runner = MigrationRunner::from_config(config);

    if !json {
        println!("🚀 Running {} migration steps", plan.len());
        println!("==============================");
    }

    let result = match connect(config).await {
        Ok(pool) => {
            let result = runner.run(&plan, pool.as_ref()).await;
            if let Err(e) = pool.close().await {
                tracing::warn!("Failed to close connection pool: {}", e);
            }
            result
        }
        Err(e) => MigrationResult::fatal(format!("{:#}", e), 0),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in result_lines(&result) {
            println!("{}", line);
        }
    }

    Ok(result.status)
}

/// Prints the dry run and returns the exit code: 2 when a check could not be evaluated
pub async fn status(config: &MigrateConfig, plan_path: Option<&Path>) -> anyhow::Result<i32> {
    let plan = load_plan(plan_path, None)?;
    let pool = connect(config).await?;
    let mut conn = pool.acquire().await?;

    let reports = MigrationRunner::from_config(config)
        .dry_run(&plan, &mut *conn)
        .await;

    conn.close().await?;
    pool.close().await?;

    println!("📋 Migration Status");
    println!("===================");
    for report in &reports {
        println!("{}", status_line(report));
    }

    let pending = reports
        .iter()
        .filter(|report| report.status == StepStatus::Pending)
        .count();
    println!();
    println!("{} of {} steps pending", pending, reports.len());
    Ok(status_exit_code(&reports))
}

fn status_exit_code(reports: &[StepStatusReport]) -> i32 {
    let unknown = reports
        .iter()
        .filter(|report| matches!(report.status, StepStatus::Unknown { .. }))
        .count();
    if unknown == 0 {
        0
    } else {
        tracing::error!("{} precondition checks could not be evaluated", unknown);
        2
    }
}

fn outcome_line(step: &StepOutcome) -> String {
    match &step.outcome {
        ExecutionOutcome::Applied => format!(
            "  ✅ {} applied ({} statements)",
            step.name, step.statements_executed
        ),
        ExecutionOutcome::SkippedAlreadyApplied { reason } => {
            format!("  ⏭️  {} skipped: {}", step.name, reason)
        }
        ExecutionOutcome::Failed { cause } => format!("  ❌ {} failed: {}", step.name, cause),
    }
}

fn result_lines(result: &MigrationResult) -> Vec<String> {
    let mut lines: Vec<String> = result.outcomes.iter().map(outcome_line).collect();

    lines.push(String::new());
    lines.push(format!(
        "Applied: {}, Skipped: {}, Failed: {} ({} ms)",
        result.applied_count(),
        result.skipped_count(),
        result.failed_count(),
        result.execution_time_ms
    ));

    let status = match result.status {
        RunStatus::Success => "✅ Migration run succeeded".to_string(),
        RunStatus::PartialFailure => "⚠️  Migration run finished with failures".to_string(),
        RunStatus::Fatal => "❌ Migration run aborted".to_string(),
    };
    lines.push(match &result.error {
        Some(error) => format!("{}: {}", status, error),
        None => status,
    });

    lines
}

fn status_line(report: &StepStatusReport) -> String {
    let marker = match report.status {
        StepStatus::Pending => "⏳",
        StepStatus::AlreadyApplied => "✅",
        StepStatus::Unknown { .. } => "❓",
    };
    format!("  {} {} {} [{}]", marker, report.name, report.status, report.check)
}
