//! Migration Plans - ordered, uniquely named steps
//!
//! Plans are built in code or loaded from YAML:
//!
//! ```yaml
//! split_mode: naive          # or quote_aware
//! steps:
//!   - name: add_users_nickname
//!     precondition: { column_exists: { table: users, column: nickname } }
//!     sql: "ALTER TABLE users ADD COLUMN nickname VARCHAR(64);"
//!   - name: backfill
//!     precondition: { query_returns_rows: "SELECT 1 FROM users WHERE nickname IS NULL LIMIT 1" }
//!     negate: true
//!     statements: ["UPDATE users SET nickname = name WHERE nickname IS NULL"]
//!     transactional: true
//!   - name: seed
//!     precondition: always_run
//!     sql_file: seed.sql       # relative to the plan file
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::splitter::SplitMode;
use super::step::{MigrationStep, PreconditionCheck};
use crate::error::{MigrateError, MigrateResult};

/// Ordered list of migration steps with unique names
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
    split_mode: SplitMode,
}

impl MigrationPlan {
    /// Build a plan, rejecting empty, padded or duplicate step names
    pub fn new(steps: Vec<MigrationStep>) -> MigrateResult<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if step.name().trim().is_empty() {
                return Err(MigrateError::Plan("step name cannot be empty".to_string()));
            }
            if step.name().trim() != step.name() {
                return Err(MigrateError::Plan(format!(
                    "step name '{}' has leading or trailing whitespace",
                    step.name()
                )));
            }
            if !seen.insert(step.name()) {
                return Err(MigrateError::Plan(format!(
                    "duplicate step name '{}'",
                    step.name()
                )));
            }
        }

        Ok(Self {
            steps,
            split_mode: SplitMode::default(),
        })
    }

    pub fn with_split_mode(mut self, split_mode: SplitMode) -> Self {
        self.split_mode = split_mode;
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn split_mode(&self) -> SplitMode {
        self.split_mode
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Load a YAML plan file; `sql_file` paths resolve against its directory
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Io(format!("failed to read plan {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let plan = Self::from_yaml_str(&yaml, base_dir)?;
        tracing::debug!("Loaded plan {} ({} steps)", path.display(), plan.len());
        Ok(plan)
    }

    /// Parse a YAML plan; `sql_file` paths resolve against `base_dir`
    pub fn from_yaml_str(yaml: &str, base_dir: &Path) -> MigrateResult<Self> {
        let file: PlanFile = serde_yaml::from_str(yaml)?;

        let steps = file
            .steps
            .into_iter()
            .map(|step| step.into_step(base_dir))
            .collect::<MigrateResult<Vec<_>>>()?;

        Ok(Self::new(steps)?.with_split_mode(file.split_mode))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    #[serde(default)]
    split_mode: SplitMode,
    steps: Vec<StepFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepFile {
    name: String,
    #[serde(default)]
    precondition: PreconditionFile,
    #[serde(default)]
    negate: bool,
    sql: Option<String>,
    sql_file: Option<PathBuf>,
    statements: Option<Vec<String>>,
    #[serde(default)]
    transactional: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PreconditionFile {
    ColumnExists {
        table: String,
        column: String,
    },
    TableExists {
        table: String,
    },
    #[default]
    AlwaysRun,
    QueryReturnsRows(String),
}

impl StepFile {
    fn into_step(self, base_dir: &Path) -> MigrateResult<MigrationStep> {
        let mut check = match self.precondition {
            PreconditionFile::ColumnExists { table, column } => {
                PreconditionCheck::column_exists(table, column)
            }
            PreconditionFile::TableExists { table } => PreconditionCheck::table_exists(table),
            PreconditionFile::AlwaysRun => PreconditionCheck::AlwaysRun,
            PreconditionFile::QueryReturnsRows(sql) => PreconditionCheck::query_returns_rows(sql),
        };
        if self.negate {
            check = check.negate();
        }

        let step = MigrationStep::new(self.name.as_str())
            .skip_if(check)
            .transactional(self.transactional);

        match (self.sql, self.sql_file, self.statements) {
            (Some(sql), None, None) => Ok(step.sql(sql)),
            (None, Some(file), None) => {
                let path = base_dir.join(file);
                let sql = std::fs::read_to_string(&path).map_err(|e| {
                    MigrateError::Io(format!(
                        "step '{}': failed to read {}: {}",
                        self.name,
                        path.display(),
                        e
                    ))
                })?;
                Ok(step.sql(sql))
            }
            (None, None, Some(statements)) => Ok(step.statements(statements)),
            _ => Err(MigrateError::Plan(format!(
                "step '{}' must have exactly one of sql, sql_file or statements",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::step::StepBody;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = MigrationPlan::new(vec![
            MigrationStep::new("add_age").sql("ALTER TABLE users ADD COLUMN age INT"),
            MigrationStep::new("add_age").sql("ALTER TABLE users ADD COLUMN age2 INT"),
        ]);
        match result {
            Err(MigrateError::Plan(msg)) => assert!(msg.contains("duplicate step name 'add_age'")),
            other => panic!("expected plan error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(MigrationPlan::new(vec![MigrationStep::new("  ")]).is_err());
    }

    #[test]
    fn test_padded_name_rejected() {
        let result = MigrationPlan::new(vec![
            MigrationStep::new("add_age").sql("ALTER TABLE users ADD COLUMN age INT"),
            MigrationStep::new("add_age ").sql("ALTER TABLE users ADD COLUMN age INT"),
        ]);
        match result {
            Err(MigrateError::Plan(msg)) => assert!(msg.contains("leading or trailing whitespace")),
            other => panic!("expected plan error, got {:?}", other),
        }
    }

    #[test]
    fn test_yaml_plan() {
        let yaml = r#"
split_mode: quote_aware
steps:
  - name: add_users_nickname
    precondition: { column_exists: { table: users, column: nickname } }
    sql: "ALTER TABLE users ADD COLUMN nickname VARCHAR(64);"
  - name: create_audit
    precondition: { table_exists: { table: audit_log } }
    statements:
      - "CREATE TABLE audit_log (id INT)"
    transactional: true
  - name: backfill
    precondition: { query_returns_rows: "SELECT 1 FROM users WHERE nickname IS NULL LIMIT 1" }
    negate: true
    statements: ["UPDATE users SET nickname = name WHERE nickname IS NULL"]
  - name: touch
    statements: ["SELECT 1"]
"#;
        let plan = MigrationPlan::from_yaml_str(yaml, Path::new(".")).unwrap();

        assert_eq!(plan.split_mode(), SplitMode::QuoteAware);
        let names: Vec<_> = plan.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["add_users_nickname", "create_audit", "backfill", "touch"]);

        let steps = plan.steps();
        assert_eq!(steps[0].precondition().describe(), "column users.nickname exists");
        assert!(matches!(steps[0].body(), StepBody::Script(_)));
        assert!(steps[1].is_transactional());
        assert_eq!(steps[1].precondition().describe(), "table audit_log exists");
        assert!(steps[2].precondition().describe().starts_with("not (query returns rows"));
        assert!(matches!(steps[3].precondition(), PreconditionCheck::AlwaysRun));
    }

    #[test]
    fn test_yaml_sql_file_is_relative_to_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seed.sql"), "INSERT INTO roles (name) VALUES ('admin');").unwrap();
        std::fs::write(
            dir.path().join("plan.yaml"),
            "steps:\n  - name: seed\n    precondition: always_run\n    sql_file: seed.sql\n",
        )
        .unwrap();

        let plan = MigrationPlan::from_file(dir.path().join("plan.yaml")).unwrap();
        assert_eq!(
            plan.steps()[0].body(),
            &StepBody::Script("INSERT INTO roles (name) VALUES ('admin');".to_string())
        );
    }

    #[test]
    fn test_yaml_step_needs_exactly_one_body() {
        let yaml = "steps:\n  - name: broken\n    sql: \"SELECT 1\"\n    statements: [\"SELECT 2\"]\n";
        assert!(matches!(
            MigrationPlan::from_yaml_str(yaml, Path::new(".")),
            Err(MigrateError::Plan(_))
        ));

        let yaml = "steps:\n  - name: empty\n";
        assert!(MigrationPlan::from_yaml_str(yaml, Path::new(".")).is_err());
    }

    #[test]
    fn test_yaml_rejects_unknown_keys_and_duplicates() {
        let yaml = "steps:\n  - name: a\n    sql: x\n    retries: 3\n";
        assert!(MigrationPlan::from_yaml_str(yaml, Path::new(".")).is_err());

        let yaml = "steps:\n  - name: a\n    sql: x\n  - name: a\n    sql: y\n";
        assert!(MigrationPlan::from_yaml_str(yaml, Path::new(".")).is_err());
    }

    #[test]
    fn test_missing_sql_file() {
        let yaml = "steps:\n  - name: seed\n    sql_file: does_not_exist.sql\n";
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MigrationPlan::from_yaml_str(yaml, dir.path()),
            Err(MigrateError::Io(_))
        ));
    }
}
