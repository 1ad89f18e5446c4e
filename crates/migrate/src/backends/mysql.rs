//! MySQL Backend Implementation
//!
//! MySQL/MariaDB implementation of the backend traits using sqlx. Mirrors the
//! PostgreSQL backend; the differences are the row decoding table and the
//! vendor error numbers carried through [`from_sqlx`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySql, Pool, Row as SqlxRow, TypeInfo, ValueRef};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{from_sqlx, MigrateError, MigrateResult};

const BACKEND: DatabaseBackendType = DatabaseBackendType::MySQL;

/// MySQL database backend implementation
#[derive(Debug)]
pub struct MySqlBackend;

impl MySqlBackend {
    /// Create a new MySQL backend instance
    pub fn new() -> Self {
        Self
    }
}

impl Default for MySqlBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseBackend for MySqlBackend {
    async fn create_pool(
        &self,
        database_url: &str,
        config: DatabasePoolConfig,
    ) -> MigrateResult<Arc<dyn DatabasePool>> {
        let mut options = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        let sqlx_pool = options.connect(database_url).await.map_err(|e| {
            MigrateError::Connection(format!("Failed to create MySQL pool: {}", e))
        })?;

        tracing::debug!("MySQL pool created (max connections: {})", config.max_connections);
        Ok(Arc::new(MySqlPool::new(sqlx_pool)))
    }

    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    fn validate_database_url(&self, url: &str) -> MigrateResult<()> {
        validate_url_scheme(url, &["mysql"], BACKEND)
    }
}

/// MySQL connection pool implementation
pub struct MySqlPool {
    pool: Pool<MySql>,
}

impl MySqlPool {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabasePool for MySqlPool {
    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        let conn = self.pool.acquire().await.map_err(|e| {
            MigrateError::Connection(format!("Failed to acquire connection: {}", e))
        })?;

        tracing::debug!(
            "MySQL connection acquired (total: {}, idle: {})",
            self.pool.size(),
            self.pool.num_idle()
        );
        Ok(Box::new(MySqlConnection::new(conn)))
    }

    async fn close(&self) -> MigrateResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// MySQL connection implementation
pub struct MySqlConnection {
    conn: sqlx::pool::PoolConnection<MySql>,
}

impl MySqlConnection {
    pub fn new(conn: sqlx::pool::PoolConnection<MySql>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DatabaseConnection for MySqlConnection {
    fn backend_type(&self) -> DatabaseBackendType {
        BACKEND
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        // COM_QUERY for plain statements: not every DDL form is preparable.
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
            .map(|row| Box::new(MySqlDbRow::new(row)) as Box<dyn DatabaseRow>)
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

        Ok(row.map(|r| Box::new(MySqlDbRow::new(r)) as Box<dyn DatabaseRow>))
    }

    async fn close(&mut self) -> MigrateResult<()> {
        Ok(())
    }
}

/// MySQL row implementation
pub struct MySqlDbRow {
    row: MySqlRow,
}

impl MySqlDbRow {
    pub fn new(row: MySqlRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for MySqlDbRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        if index >= self.row.len() {
            return Err(MigrateError::Query(format!(
                "Column index {} out of bounds ({} columns)",
                index,
                self.row.len()
            )));
        }
        mysql_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        // information_schema column names come back upper-cased on MySQL 8
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::Query(format!("Column '{}' not found", name)))?;

        mysql_value_to_database_value(&self.row, index)
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

fn bind_all<'q>(mut query: MySqlQuery<'q>, params: &[DatabaseValue]) -> MySqlQuery<'q> {
    for param in params {
        query = match param {
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
        };
    }
    query
}

fn decode_error(kind: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::Query(format!("Failed to get {} value: {}", kind, e))
}

/// Convert a MySQL column value to DatabaseValue
fn mysql_value_to_database_value(row: &MySqlRow, index: usize) -> MigrateResult<DatabaseValue> {
    let raw = row.try_get_raw(index).map_err(|e| from_sqlx(BACKEND, e))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();

    match type_name.as_str() {
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(DatabaseValue::Bool)
            .map_err(|e| decode_error("bool", e)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<i64, _>(index)
            .map(DatabaseValue::Int64)
            .map_err(|e| decode_error("integer", e)),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(index)
            .map(|v| DatabaseValue::Int64(v as i64))
            .map_err(|e| decode_error("unsigned integer", e)),
        "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(DatabaseValue::Float64)
            .map_err(|e| decode_error("float", e)),
        "DATETIME" | "TIMESTAMP" => row
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
        "JSON" => row
            .try_get::<JsonValue, _>(index)
            .map(DatabaseValue::Json)
            .map_err(|e| decode_error("JSON", e)),
        // Text first, then raw bytes: binary collations report as VARBINARY/BLOB.
        _ => match row.try_get::<String, _>(index) {
            Ok(value) => Ok(DatabaseValue::String(value)),
            Err(_) => row
                .try_get::<Vec<u8>, _>(index)
                .map(DatabaseValue::Bytes)
                .map_err(|e| {
                    MigrateError::Query(format!(
                        "Failed to get value for type '{}': {}",
                        type_name, e
                    ))
                }),
        },
    }
}
