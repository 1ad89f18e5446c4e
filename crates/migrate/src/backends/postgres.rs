//! PostgreSQL Backend Implementation
//!
//! PostgreSQL implementation of the backend traits using sqlx.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Pool, Postgres, Row as SqlxRow, TypeInfo, ValueRef};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{from_sqlx, MigrateError, MigrateResult};

const BACKEND: DatabaseBackendType = DatabaseBackendType::PostgreSQL;

/// PostgreSQL database backend implementation
#[derive(Debug)]
pub struct PostgresBackend;

impl PostgresBackend {
    /// Create a new PostgreSQL backend instance
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
    async fn create_pool(
        &self,
        database_url: &str,
        config: DatabasePoolConfig,
    ) -> MigrateResult<Arc<dyn DatabasePool>> {
        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        let sqlx_pool = options.connect(database_url).await.map_err(|e| {
            MigrateError::Connection(format!("Failed to create PostgreSQL pool: {}", e))
        })?;

        tracing::debug!("PostgreSQL pool created (max connections: {})", config.max_connections);
        Ok(Arc::new(PostgresPool::new(sqlx_pool)))
    }

    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    fn validate_database_url(&self, url: &str) -> MigrateResult<()> {
        validate_url_scheme(url, &["postgres", "postgresql"], BACKEND)
    }
}

/// PostgreSQL connection pool implementation
pub struct PostgresPool {
    pool: Pool<Postgres>,
}

impl PostgresPool {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        let conn = self.pool.acquire().await.map_err(|e| {
            MigrateError::Connection(format!("Failed to acquire connection: {}", e))
        })?;

        tracing::debug!(
            "PostgreSQL connection acquired (total: {}, idle: {})",
            self.pool.size(),
            self.pool.num_idle()
        );
        Ok(Box::new(PostgresConnection::new(conn)))
    }

    async fn close(&self) -> MigrateResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: sqlx::pool::PoolConnection<Postgres>,
}

impl PostgresConnection {
    pub fn new(conn: sqlx::pool::PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        // Unparameterized statements go over the simple query protocol so DDL
        // that cannot be prepared still runs.
        let result = if params.is_empty() {
            (&mut *self.conn).execute(sql).await
        } else {
            bind_all(sqlx::query(sql), params)
                .execute(&mut *self.conn)
                .await
        };

        result
            .map(|done| done.rows_affected())
            .map_err(|e| from_sqlx(BACKEND, e))
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = if params.is_empty() {
            (&mut *self.conn).fetch_all(sql).await
        } else {
            bind_all(sqlx::query(sql), params)
                .fetch_all(&mut *self.conn)
                .await
        }
        .map_err(|e| from_sqlx(BACKEND, e))?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Option<Box<dyn DatabaseRow>>> {
        let row = if params.is_empty() {
            (&mut *self.conn).fetch_optional(sql).await
        } else {
            bind_all(sqlx::query(sql), params)
                .fetch_optional(&mut *self.conn)
                .await
        }
        .map_err(|e| from_sqlx(BACKEND, e))?;

        Ok(row.map(|r| Box::new(PostgresRow::new(r)) as Box<dyn DatabaseRow>))
    }

    async fn close(&mut self) -> MigrateResult<()> {
        // Connection will be returned to pool automatically when dropped
        Ok(())
    }
}

/// PostgreSQL row implementation
pub struct PostgresRow {
    row: PgRow,
}

impl PostgresRow {
    pub fn new(row: PgRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for PostgresRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        if index >= self.row.len() {
            return Err(MigrateError::Query(format!(
                "Column index {} out of bounds ({} columns)",
                index,
                self.row.len()
            )));
        }
        postgres_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| MigrateError::Query(format!("Column '{}' not found", name)))?;

        postgres_value_to_database_value(&self.row, index)
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

fn bind_all<'q>(mut query: PgQuery<'q>, params: &[DatabaseValue]) -> PgQuery<'q> {
    for param in params {
        query = bind_database_value(query, param);
    }
    query
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(query: PgQuery<'q>, value: &DatabaseValue) -> PgQuery<'q> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Time(t) => query.bind(*t),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn decode_error(kind: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::Query(format!("Failed to get {} value: {}", kind, e))
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> MigrateResult<DatabaseValue> {
    let raw = row.try_get_raw(index).map_err(|e| from_sqlx(BACKEND, e))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();

    match type_name.as_str() {
        "BOOL" => row
            .try_get::<bool, _>(index)
            .map(DatabaseValue::Bool)
            .map_err(|e| decode_error("bool", e)),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map(|v| DatabaseValue::Int32(v as i32))
            .map_err(|e| decode_error("int16", e)),
        "INT4" => row
            .try_get::<i32, _>(index)
            .map(DatabaseValue::Int32)
            .map_err(|e| decode_error("int32", e)),
        "INT8" => row
            .try_get::<i64, _>(index)
            .map(DatabaseValue::Int64)
            .map_err(|e| decode_error("int64", e)),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .map(|v| DatabaseValue::Float64(v as f64))
            .map_err(|e| decode_error("float32", e)),
        "FLOAT8" => row
            .try_get::<f64, _>(index)
            .map(DatabaseValue::Float64)
            .map_err(|e| decode_error("float64", e)),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(DatabaseValue::Bytes)
            .map_err(|e| decode_error("bytes", e)),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(DatabaseValue::DateTime)
            .map_err(|e| decode_error("datetime", e)),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| DatabaseValue::DateTime(v.and_utc()))
            .map_err(|e| decode_error("datetime", e)),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(DatabaseValue::Date)
            .map_err(|e| decode_error("date", e)),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(DatabaseValue::Time)
            .map_err(|e| decode_error("time", e)),
        "JSON" | "JSONB" => row
            .try_get::<JsonValue, _>(index)
            .map(DatabaseValue::Json)
            .map_err(|e| decode_error("JSON", e)),
        _ => row
            .try_get::<String, _>(index)
            .map(DatabaseValue::String)
            .map_err(|e| {
                MigrateError::Query(format!(
                    "Failed to get value as string for type '{}': {}",
                    type_name, e
                ))
            }),
    }
}
