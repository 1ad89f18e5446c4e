//! In-memory connection doubles for unit tests
//!
//! `MockConnection` keeps a tiny table -> columns schema and understands just
//! enough DDL (`ALTER TABLE .. ADD COLUMN`, `CREATE TABLE`, `DROP TABLE`) plus
//! the probe's metadata queries to exercise the runner end to end. Clones share
//! state, so a test keeps a handle while the runner owns the connection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::backends::{
    DatabaseBackendType, DatabaseConnection, DatabasePool, DatabaseRow, DatabaseValue,
};
use crate::error::{DatabaseError, MigrateError, MigrateResult};
use crate::schema::probe::{column_exists_query, describe_table_query, table_exists_query};

pub(crate) type Schema = BTreeMap<String, Vec<(String, String)>>;

#[derive(Default)]
struct MockState {
    schema: Schema,
    execute_calls: usize,
    fetch_calls: usize,
    executed: Vec<String>,
    statement_failures: Vec<(String, DatabaseError)>,
    query_failures: Vec<(String, DatabaseError)>,
    query_rows: HashMap<String, usize>,
    // Schema as of BEGIN, then one snapshot per open savepoint
    transaction: Option<Schema>,
    savepoints: Vec<(String, Schema)>,
    closed: bool,
}

#[derive(Clone)]
pub(crate) struct MockConnection {
    backend: DatabaseBackendType,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new(backend: DatabaseBackendType) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn mysql() -> Self {
        Self::new(DatabaseBackendType::MySQL)
    }

    pub fn with_table(self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.lock().schema.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(name, data_type)| (name.to_string(), data_type.to_string()))
                .collect(),
        );
        self
    }

    /// Statements containing `pattern` fail with the given vendor code
    pub fn fail_on(self, pattern: &str, code: &str, message: &str) -> Self {
        let error = self.error(code, message);
        self.lock()
            .statement_failures
            .push((pattern.to_string(), error));
        self
    }

    /// Queries containing `pattern` fail with the given vendor code
    pub fn fail_query_on(self, pattern: &str, code: &str, message: &str) -> Self {
        let error = self.error(code, message);
        self.lock().query_failures.push((pattern.to_string(), error));
        self
    }

    /// `sql` returns `rows` single-column rows
    pub fn with_query_rows(self, sql: &str, rows: usize) -> Self {
        self.lock().query_rows.insert(sql.to_string(), rows);
        self
    }

    pub fn add_column(&self, table: &str, column: &str, data_type: &str) {
        self.lock()
            .schema
            .entry(table.to_string())
            .or_default()
            .push((column.to_string(), data_type.to_string()));
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.lock()
            .schema
            .get(table)
            .map(|columns| columns.iter().any(|(name, _)| name == column))
            .unwrap_or(false)
    }

    pub fn schema(&self) -> Schema {
        self.lock().schema.clone()
    }

    pub fn execute_calls(&self) -> usize {
        self.lock().execute_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    /// Every statement passed to `execute`, failed ones included
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn error(&self, code: &str, message: &str) -> DatabaseError {
        DatabaseError::new(Some(self.backend), Some(code.to_string()), message)
    }

    fn codes(&self) -> Codes {
        match self.backend {
            DatabaseBackendType::MySQL => Codes {
                duplicate_column: "1060",
                table_exists: "1050",
                no_such_table: "1146",
            },
            DatabaseBackendType::PostgreSQL => Codes {
                duplicate_column: "42701",
                table_exists: "42P07",
                no_such_table: "42P01",
            },
        }
    }

    fn apply_ddl(&self, sql: &str) -> MigrateResult<u64> {
        let codes = self.codes();
        let words: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        match upper.as_slice() {
            ["ALTER", "TABLE", _, "ADD", "COLUMN", _, ..] => {
                let table = unquote(words[2]);
                let column = unquote(words[5]);
                let data_type = words[6..].join(" ");
                let mut state = self.lock();
                let columns = state.schema.get_mut(&table).ok_or_else(|| {
                    self.error(codes.no_such_table, &format!("Table '{}' doesn't exist", table))
                })?;
                if columns.iter().any(|(name, _)| *name == column) {
                    return Err(self
                        .error(
                            codes.duplicate_column,
                            &format!("Duplicate column name '{}'", column),
                        )
                        .into());
                }
                columns.push((column, data_type));
                Ok(0)
            }
            ["CREATE", "TABLE", ..] => {
                let (table, columns) = parse_create_table(sql)
                    .ok_or_else(|| self.error("1064", "unsupported CREATE TABLE"))?;
                let mut state = self.lock();
                if state.schema.contains_key(&table) {
                    return Err(self
                        .error(codes.table_exists, &format!("Table '{}' already exists", table))
                        .into());
                }
                state.schema.insert(table, columns);
                Ok(0)
            }
            ["DROP", "TABLE", _] => {
                let table = unquote(words[2]);
                self.lock().schema.remove(&table).ok_or_else(|| {
                    self.error(codes.no_such_table, &format!("Unknown table '{}'", table))
                })?;
                Ok(0)
            }
            _ => Ok(1),
        }
    }

    fn rows_for(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<MockRow>> {
        let dialect = self.backend.dialect();
        let text = |index: usize| -> String {
            params
                .get(index)
                .and_then(DatabaseValue::as_text)
                .unwrap_or_default()
        };
        let one = || vec![MockRow::new(&["?column?"], vec![DatabaseValue::Int32(1)])];

        let state = self.lock();
        if sql == column_exists_query(dialect, "t", "c").sql {
            let found = state
                .schema
                .get(&text(0))
                .map(|columns| columns.iter().any(|(name, _)| *name == text(1)))
                .unwrap_or(false);
            return Ok(if found { one() } else { Vec::new() });
        }
        if sql == table_exists_query(dialect, "t").sql {
            return Ok(if state.schema.contains_key(&text(0)) {
                one()
            } else {
                Vec::new()
            });
        }
        if sql == describe_table_query(dialect, "t").sql {
            let columns = state.schema.get(&text(0)).cloned().unwrap_or_default();
            return Ok(columns
                .into_iter()
                .map(|(name, data_type)| {
                    MockRow::new(
                        &["column_name", "data_type", "is_nullable", "column_default"],
                        vec![
                            DatabaseValue::String(name),
                            DatabaseValue::String(data_type),
                            DatabaseValue::from("YES"),
                            DatabaseValue::Null,
                        ],
                    )
                })
                .collect());
        }
        if let Some(rest) = sql.strip_prefix("SHOW CREATE TABLE ") {
            let table = unquote(rest);
            let columns = state.schema.get(&table).ok_or_else(|| {
                self.error(
                    self.codes().no_such_table,
                    &format!("Table 'app.{}' doesn't exist", table),
                )
            })?;
            let body: Vec<String> = columns
                .iter()
                .map(|(name, data_type)| format!("  `{}` {}", name, data_type))
                .collect();
            let ddl = format!("CREATE TABLE `{}` (\n{}\n)", table, body.join(",\n"));
            return Ok(vec![MockRow::new(
                &["Table", "Create Table"],
                vec![DatabaseValue::String(table), DatabaseValue::String(ddl)],
            )]);
        }

        let rows = state.query_rows.get(sql).copied().unwrap_or(0);
        Ok((0..rows).flat_map(|_| one()).collect())
    }
}

struct Codes {
    duplicate_column: &'static str,
    table_exists: &'static str,
    no_such_table: &'static str,
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim_matches(|c| c == '`' || c == '"' || c == ';')
        .to_string()
}

fn parse_create_table(sql: &str) -> Option<(String, Vec<(String, String)>)> {
    let open = sql.find('(')?;
    let close = sql.rfind(')')?;
    let table = unquote(sql[..open].split_whitespace().last()?);
    let columns = sql[open + 1..close]
        .split(',')
        .filter_map(|definition| {
            let mut parts = definition.split_whitespace();
            let name = unquote(parts.next()?);
            Some((name, parts.collect::<Vec<_>>().join(" ")))
        })
        .collect();
    Some((table, columns))
}

fn savepoint_index(savepoints: &[(String, Schema)], name: &str) -> MigrateResult<usize> {
    savepoints
        .iter()
        .rposition(|(saved, _)| saved == name)
        .ok_or_else(|| MigrateError::Query(format!("savepoint \"{}\" does not exist", name)))
}

fn scripted_failure(failures: &[(String, DatabaseError)], sql: &str) -> Option<MigrateError> {
    failures
        .iter()
        .find(|(pattern, _)| sql.contains(pattern.as_str()))
        .map(|(_, error)| MigrateError::Database(error.clone()))
}

#[async_trait]
impl DatabaseConnection for MockConnection {
    fn backend_type(&self) -> DatabaseBackendType {
        self.backend
    }

    async fn execute(&mut self, sql: &str, _params: &[DatabaseValue]) -> MigrateResult<u64> {
        {
            let mut state = self.lock();
            state.execute_calls += 1;
            state.executed.push(sql.to_string());
            if let Some(error) = scripted_failure(&state.statement_failures, sql) {
                return Err(error);
            }
        }

        let upper = sql.trim().to_ascii_uppercase();
        let words: Vec<&str> = upper.split_whitespace().collect();
        let mut state = self.lock();
        match words.as_slice() {
            ["BEGIN"] => {
                state.transaction = Some(state.schema.clone());
                Ok(0)
            }
            ["COMMIT"] => {
                state.transaction = None;
                state.savepoints.clear();
                Ok(0)
            }
            ["ROLLBACK"] => {
                let before = state.transaction.take();
                if let Some(schema) = before {
                    state.schema = schema;
                }
                state.savepoints.clear();
                Ok(0)
            }
            ["SAVEPOINT", name] => {
                let snapshot = state.schema.clone();
                state.savepoints.push((name.to_string(), snapshot));
                Ok(0)
            }
            ["RELEASE", "SAVEPOINT", name] => {
                let index = savepoint_index(&state.savepoints, name)?;
                state.savepoints.truncate(index);
                Ok(0)
            }
            ["ROLLBACK", "TO", "SAVEPOINT", name] => {
                let index = savepoint_index(&state.savepoints, name)?;
                state.savepoints.truncate(index + 1);
                let snapshot = state.savepoints[index].1.clone();
                state.schema = snapshot;
                Ok(0)
            }
            _ => {
                drop(state);
                self.apply_ddl(sql)
            }
        }
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        {
            let mut state = self.lock();
            state.fetch_calls += 1;
            if let Some(error) = scripted_failure(&state.query_failures, sql) {
                return Err(error);
            }
        }

        Ok(self
            .rows_for(sql, params)?
            .into_iter()
            .map(|row| Box::new(row) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Option<Box<dyn DatabaseRow>>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn close(&mut self) -> MigrateResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}

pub(crate) struct MockRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl MockRow {
    fn new(columns: &[&str], values: Vec<DatabaseValue>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values,
        }
    }
}

impl DatabaseRow for MockRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| MigrateError::Query(format!("Column index {} out of bounds", index)))
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| MigrateError::Query(format!("Column '{}' not found", name)))?;
        self.get_by_index(index)
    }
}

/// Pool handing out clones of one shared `MockConnection`
pub(crate) struct MockPool {
    connection: Option<MockConnection>,
    acquire_error: String,
    acquired: AtomicUsize,
}

impl MockPool {
    pub fn new(connection: MockConnection) -> Self {
        Self {
            connection: Some(connection),
            acquire_error: String::new(),
            acquired: AtomicUsize::new(0),
        }
    }

    /// A pool whose every acquire fails
    pub fn failing(message: &str) -> Self {
        Self {
            connection: None,
            acquire_error: message.to_string(),
            acquired: AtomicUsize::new(0),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn connection(&self) -> MockConnection {
        self.connection.clone().expect("failing pool has no connection")
    }
}

#[async_trait]
impl DatabasePool for MockPool {
    fn backend_type(&self) -> DatabaseBackendType {
        self.connection
            .as_ref()
            .map(|conn| conn.backend)
            .unwrap_or(DatabaseBackendType::MySQL)
    }

    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        match &self.connection {
            Some(connection) => {
                self.acquired.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(connection.clone()))
            }
            None => Err(MigrateError::Connection(format!(
                "Failed to acquire connection: {}",
                self.acquire_error
            ))),
        }
    }

    async fn close(&self) -> MigrateResult<()> {
        Ok(())
    }
}
