//! Migration Steps - a named unit of work guarded by a precondition

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::splitter::StatementSplitter;
use crate::error::MigrateResult;
use crate::schema::SchemaProbe;

/// Caller-supplied "is this change already in place?" check.
///
/// Implementations must only read from the database.
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Human readable description used in logs and skip reasons
    fn describe(&self) -> String;

    /// `true` when the change is present and the step must be skipped
    async fn is_satisfied(&self, probe: &mut SchemaProbe<'_>) -> MigrateResult<bool>;
}

/// Check evaluated before a step runs
#[derive(Clone)]
pub enum PreconditionCheck {
    ColumnExists { table: String, column: String },
    TableExists { table: String },
    AlwaysRun,
    Custom(Arc<dyn Precondition>),
}

impl PreconditionCheck {
    pub fn column_exists(table: impl Into<String>, column: impl Into<String>) -> Self {
        PreconditionCheck::ColumnExists {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn table_exists(table: impl Into<String>) -> Self {
        PreconditionCheck::TableExists {
            table: table.into(),
        }
    }

    pub fn custom(precondition: impl Precondition + 'static) -> Self {
        PreconditionCheck::Custom(Arc::new(precondition))
    }

    /// Skip when the query returns at least one row
    pub fn query_returns_rows(sql: impl Into<String>) -> Self {
        Self::custom(QueryReturnsRows::new(sql))
    }

    /// Invert this check
    pub fn negate(self) -> Self {
        Self::custom(Not(self))
    }

    /// `true` means "already applied": the step's statements must not run
    pub async fn evaluate(&self, probe: &mut SchemaProbe<'_>) -> MigrateResult<bool> {
        match self {
            PreconditionCheck::ColumnExists { table, column } => {
                probe.column_exists(table, column).await
            }
            PreconditionCheck::TableExists { table } => probe.table_exists(table).await,
            PreconditionCheck::AlwaysRun => Ok(false),
            PreconditionCheck::Custom(check) => check.is_satisfied(probe).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PreconditionCheck::ColumnExists { table, column } => {
                format!("column {}.{} exists", table, column)
            }
            PreconditionCheck::TableExists { table } => format!("table {} exists", table),
            PreconditionCheck::AlwaysRun => "always run".to_string(),
            PreconditionCheck::Custom(check) => check.describe(),
        }
    }
}

impl Default for PreconditionCheck {
    fn default() -> Self {
        PreconditionCheck::AlwaysRun
    }
}

impl fmt::Debug for PreconditionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionCheck::ColumnExists { table, column } => f
                .debug_struct("ColumnExists")
                .field("table", table)
                .field("column", column)
                .finish(),
            PreconditionCheck::TableExists { table } => {
                f.debug_struct("TableExists").field("table", table).finish()
            }
            PreconditionCheck::AlwaysRun => write!(f, "AlwaysRun"),
            PreconditionCheck::Custom(check) => {
                f.debug_tuple("Custom").field(&check.describe()).finish()
            }
        }
    }
}

/// Satisfied when a read-only query returns at least one row
#[derive(Debug, Clone)]
pub struct QueryReturnsRows {
    sql: String,
}

impl QueryReturnsRows {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

#[async_trait]
impl Precondition for QueryReturnsRows {
    fn describe(&self) -> String {
        format!("query returns rows: {}", self.sql)
    }

    async fn is_satisfied(&self, probe: &mut SchemaProbe<'_>) -> MigrateResult<bool> {
        probe.query_has_rows(&self.sql).await
    }
}

/// Inverts another check
#[derive(Debug, Clone)]
pub struct Not(pub PreconditionCheck);

#[async_trait]
impl Precondition for Not {
    fn describe(&self) -> String {
        format!("not ({})", self.0.describe())
    }

    async fn is_satisfied(&self, probe: &mut SchemaProbe<'_>) -> MigrateResult<bool> {
        Ok(!self.0.evaluate(probe).await?)
    }
}

/// SQL carried by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepBody {
    /// Raw script, split at run time
    Script(String),
    /// Statements used as given
    Statements(Vec<String>),
}

impl StepBody {
    /// Executable statements, in order
    pub fn statements(&self, splitter: &StatementSplitter) -> Vec<String> {
        match self {
            StepBody::Script(sql) => splitter.split(sql),
            StepBody::Statements(statements) => statements
                .iter()
                .map(|statement| statement.trim())
                .filter(|statement| !statement.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// A named, precondition-guarded unit of schema change
///
/// ```ignore
/// let step = MigrationStep::new("add_users_nickname")
///     .skip_if(PreconditionCheck::column_exists("users", "nickname"))
///     .sql("ALTER TABLE users ADD COLUMN nickname VARCHAR(64);");
/// ```
#[derive(Debug, Clone)]
pub struct MigrationStep {
    name: String,
    precondition: PreconditionCheck,
    body: StepBody,
    transactional: bool,
}

impl MigrationStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            precondition: PreconditionCheck::AlwaysRun,
            body: StepBody::Statements(Vec::new()),
            transactional: false,
        }
    }

    /// Skip the step when `check` holds
    pub fn skip_if(mut self, check: PreconditionCheck) -> Self {
        self.precondition = check;
        self
    }

    /// Use a raw script as the body, replacing any previous body
    pub fn sql(mut self, script: impl Into<String>) -> Self {
        self.body = StepBody::Script(script.into());
        self
    }

    /// Append one pre-split statement
    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        match &mut self.body {
            StepBody::Statements(statements) => statements.push(statement.into()),
            StepBody::Script(_) => self.body = StepBody::Statements(vec![statement.into()]),
        }
        self
    }

    /// Use a pre-split statement list as the body
    pub fn statements<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body = StepBody::Statements(statements.into_iter().map(Into::into).collect());
        self
    }

    /// Run inside a transaction where the backend supports transactional DDL
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn precondition(&self) -> &PreconditionCheck {
        &self.precondition
    }

    pub fn body(&self) -> &StepBody {
        &self.body
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::splitter::SplitMode;
    use crate::testing::MockConnection;

    #[test]
    fn test_builder() {
        let step = MigrationStep::new("add_age")
            .skip_if(PreconditionCheck::column_exists("users", "age"))
            .statement("ALTER TABLE users ADD COLUMN age INT")
            .statement("UPDATE users SET age = 0")
            .transactional(true);

        assert_eq!(step.name(), "add_age");
        assert!(step.is_transactional());
        assert_eq!(step.precondition().describe(), "column users.age exists");
        assert_eq!(
            step.body(),
            &StepBody::Statements(vec![
                "ALTER TABLE users ADD COLUMN age INT".to_string(),
                "UPDATE users SET age = 0".to_string(),
            ])
        );
    }

    #[test]
    fn test_body_statements() {
        let splitter = StatementSplitter::new(SplitMode::Naive);
        let script = StepBody::Script("A; B;".to_string());
        assert_eq!(script.statements(&splitter), vec!["A", "B"]);

        // Pre-split statements are not split again
        let list = StepBody::Statements(vec!["SELECT 'a;b'".to_string(), "  ".to_string()]);
        assert_eq!(list.statements(&splitter), vec!["SELECT 'a;b'"]);
    }

    #[tokio::test]
    async fn test_evaluate_builtin_checks() {
        let mut conn = MockConnection::mysql().with_table("users", &[("id", "int")]);
        let mut probe = SchemaProbe::new(&mut conn);

        assert!(PreconditionCheck::table_exists("users").evaluate(&mut probe).await.unwrap());
        assert!(!PreconditionCheck::column_exists("users", "age")
            .evaluate(&mut probe)
            .await
            .unwrap());
        assert!(!PreconditionCheck::AlwaysRun.evaluate(&mut probe).await.unwrap());
    }

    #[tokio::test]
    async fn test_always_run_does_not_query() {
        let mut conn = MockConnection::mysql();
        let handle = conn.clone();
        let mut probe = SchemaProbe::new(&mut conn);

        PreconditionCheck::AlwaysRun.evaluate(&mut probe).await.unwrap();
        assert_eq!(handle.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_query_and_negated_checks() {
        let pending = "SELECT 1 FROM users WHERE nickname IS NULL LIMIT 1";
        let mut conn = MockConnection::mysql().with_query_rows(pending, 1);
        let mut probe = SchemaProbe::new(&mut conn);

        let check = PreconditionCheck::query_returns_rows(pending);
        assert!(check.evaluate(&mut probe).await.unwrap());

        let negated = check.negate();
        assert!(!negated.evaluate(&mut probe).await.unwrap());
        assert_eq!(negated.describe(), format!("not (query returns rows: {})", pending));
    }

    #[test]
    fn test_debug_of_custom_check() {
        let check = PreconditionCheck::query_returns_rows("SELECT 1");
        assert_eq!(format!("{:?}", check), "Custom(\"query returns rows: SELECT 1\")");
    }
}
