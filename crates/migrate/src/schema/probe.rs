//! Schema Probe - read-only inspection of the live schema
//!
//! Every call goes to the database; nothing is cached, so a probe used as a
//! precondition always sees the effect of the steps that ran before it.

use serde::Serialize;

use crate::backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
use crate::error::{MigrateError, MigrateResult};

/// One column of a table, as reported by information_schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// A parameterized metadata query
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProbeQuery {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

/// Inspects schema metadata over a borrowed connection
pub struct SchemaProbe<'c> {
    conn: &'c mut dyn DatabaseConnection,
    dialect: SqlDialect,
}

impl<'c> SchemaProbe<'c> {
    pub fn new(conn: &'c mut dyn DatabaseConnection) -> Self {
        let dialect = conn.backend_type().dialect();
        Self { conn, dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Whether `table` has a column named `column`
    pub async fn column_exists(&mut self, table: &str, column: &str) -> MigrateResult<bool> {
        self.has_rows(column_exists_query(self.dialect, table, column)).await
    }

    /// Whether `table` exists (views included)
    pub async fn table_exists(&mut self, table: &str) -> MigrateResult<bool> {
        self.has_rows(table_exists_query(self.dialect, table)).await
    }

    /// Columns of `table` in ordinal order.
    ///
    /// Fails with [`MigrateError::Schema`] when the table does not exist.
    pub async fn describe_table(&mut self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let query = describe_table_query(self.dialect, table);
        let rows = self.conn.fetch_all(&query.sql, &query.params).await?;

        if rows.is_empty() && !self.table_exists(table).await? {
            return Err(MigrateError::Schema(format!("table '{}' does not exist", table)));
        }

        rows.iter().map(|row| column_info_from_row(row.as_ref())).collect()
    }

    /// `CREATE TABLE` statement for `table`.
    ///
    /// MySQL reports its own DDL through `SHOW CREATE TABLE`. PostgreSQL has no
    /// equivalent, so the statement is rebuilt from [`describe_table`](Self::describe_table);
    /// it lists columns, types, nullability and defaults but not constraints or indexes.
    pub async fn show_create_table(&mut self, table: &str) -> MigrateResult<String> {
        match self.dialect {
            SqlDialect::MySQL => {
                let sql = format!("SHOW CREATE TABLE {}", self.dialect.quote_identifier(table)?);
                let row = self.conn.fetch_optional(&sql, &[]).await?.ok_or_else(|| {
                    MigrateError::Schema(format!("table '{}' does not exist", table))
                })?;

                // Second column is "Create Table" (or "Create View")
                row.get_by_index(1)?.as_text().ok_or_else(|| {
                    MigrateError::Schema(format!("no DDL returned for table '{}'", table))
                })
            }
            SqlDialect::PostgreSQL => {
                let columns = self.describe_table(table).await?;
                render_create_table(self.dialect, table, &columns)
            }
        }
    }

    /// Whether an arbitrary read-only query returns at least one row
    pub async fn query_has_rows(&mut self, sql: &str) -> MigrateResult<bool> {
        Ok(self.conn.fetch_optional(sql, &[]).await?.is_some())
    }

    async fn has_rows(&mut self, query: ProbeQuery) -> MigrateResult<bool> {
        Ok(self
            .conn
            .fetch_optional(&query.sql, &query.params)
            .await?
            .is_some())
    }
}

fn column_info_from_row(row: &dyn DatabaseRow) -> MigrateResult<ColumnInfo> {
    let text = |column: &str| -> MigrateResult<Option<String>> {
        Ok(row.get_by_name(column)?.as_text())
    };

    let name = text("column_name")?
        .ok_or_else(|| MigrateError::Query("column_name is NULL".to_string()))?;
    let data_type = text("data_type")?.unwrap_or_default();
    let nullable = text("is_nullable")?
        .map(|value| value.eq_ignore_ascii_case("YES"))
        .unwrap_or(true);

    Ok(ColumnInfo {
        name,
        data_type,
        nullable,
        default: text("column_default")?,
    })
}

fn render_create_table(
    dialect: SqlDialect,
    table: &str,
    columns: &[ColumnInfo],
) -> MigrateResult<String> {
    let mut lines = Vec::with_capacity(columns.len());
    for column in columns {
        let mut line = format!(
            "    {} {}",
            dialect.quote_identifier(&column.name)?,
            column.data_type
        );
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            line.push_str(" DEFAULT ");
            line.push_str(default);
        }
        lines.push(line);
    }

    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        dialect.quote_identifier(table)?,
        lines.join(",\n")
    ))
}

/// Placeholder-numbering builder for information_schema queries
struct QueryBuilder {
    dialect: SqlDialect,
    params: Vec<DatabaseValue>,
}

impl QueryBuilder {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &str) -> String {
        let placeholder = self.dialect.parameter_placeholder(self.params.len());
        self.params.push(DatabaseValue::from(value));
        placeholder
    }

    /// `table_schema = ... AND table_name = ...` for a possibly qualified name
    fn table_filter(&mut self, table: &str) -> String {
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, table),
        };

        let schema_condition = match schema {
            Some(schema) => format!("table_schema = {}", self.bind(schema)),
            None => match self.dialect {
                SqlDialect::PostgreSQL => "table_schema = current_schema()".to_string(),
                SqlDialect::MySQL => "table_schema = DATABASE()".to_string(),
            },
        };

        format!("{} AND table_name = {}", schema_condition, self.bind(name))
    }

    fn finish(self, sql: String) -> ProbeQuery {
        ProbeQuery {
            sql,
            params: self.params,
        }
    }
}

pub(crate) fn column_exists_query(dialect: SqlDialect, table: &str, column: &str) -> ProbeQuery {
    let mut builder = QueryBuilder::new(dialect);
    let filter = builder.table_filter(table);
    let column = builder.bind(column);
    builder.finish(format!(
        "SELECT 1 FROM information_schema.columns WHERE {} AND column_name = {} LIMIT 1",
        filter, column
    ))
}

pub(crate) fn table_exists_query(dialect: SqlDialect, table: &str) -> ProbeQuery {
    let mut builder = QueryBuilder::new(dialect);
    let filter = builder.table_filter(table);
    builder.finish(format!(
        "SELECT 1 FROM information_schema.tables WHERE {} LIMIT 1",
        filter
    ))
}

pub(crate) fn describe_table_query(dialect: SqlDialect, table: &str) -> ProbeQuery {
    let mut builder = QueryBuilder::new(dialect);
    let filter = builder.table_filter(table);
    let select = match dialect {
        // information_schema uses domain types (sql_identifier, yes_or_no) sqlx cannot decode
        SqlDialect::PostgreSQL => "SELECT column_name::text AS column_name, \
             (CASE WHEN character_maximum_length IS NOT NULL \
             THEN data_type || '(' || character_maximum_length || ')' \
             ELSE data_type END)::text AS data_type, \
             is_nullable::text AS is_nullable, \
             column_default::text AS column_default",
        SqlDialect::MySQL => "SELECT CAST(column_name AS CHAR) AS column_name, \
             CAST(column_type AS CHAR) AS data_type, \
             CAST(is_nullable AS CHAR) AS is_nullable, \
             CAST(column_default AS CHAR) AS column_default",
    };
    builder.finish(format!(
        "{} FROM information_schema.columns WHERE {} ORDER BY ordinal_position",
        select, filter
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseBackendType;
    use crate::testing::MockConnection;

    #[test]
    fn test_query_placeholders_follow_dialect() {
        let pg = column_exists_query(SqlDialect::PostgreSQL, "users", "nickname");
        assert!(pg.sql.contains("table_schema = current_schema()"));
        assert!(pg.sql.contains("table_name = $1 AND column_name = $2"));
        assert_eq!(
            pg.params,
            vec![DatabaseValue::from("users"), DatabaseValue::from("nickname")]
        );

        let mysql = column_exists_query(SqlDialect::MySQL, "users", "nickname");
        assert!(mysql.sql.contains("table_schema = DATABASE()"));
        assert!(mysql.sql.contains("table_name = ? AND column_name = ?"));
    }

    #[test]
    fn test_qualified_table_binds_schema() {
        let query = table_exists_query(SqlDialect::PostgreSQL, "audit.events");
        assert!(query.sql.contains("table_schema = $1 AND table_name = $2"));
        assert_eq!(
            query.params,
            vec![DatabaseValue::from("audit"), DatabaseValue::from("events")]
        );
    }

    #[tokio::test]
    async fn test_column_and_table_exists() {
        let mut conn = MockConnection::mysql().with_table("users", &[("id", "int"), ("name", "varchar(64)")]);
        let mut probe = SchemaProbe::new(&mut conn);

        assert!(probe.table_exists("users").await.unwrap());
        assert!(!probe.table_exists("ghosts").await.unwrap());
        assert!(probe.column_exists("users", "name").await.unwrap());
        assert!(!probe.column_exists("users", "nickname").await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_is_never_cached() {
        let mut conn = MockConnection::mysql().with_table("users", &[("id", "int")]);
        let handle = conn.clone();
        let mut probe = SchemaProbe::new(&mut conn);

        assert!(!probe.column_exists("users", "age").await.unwrap());
        handle.add_column("users", "age", "int");
        assert!(probe.column_exists("users", "age").await.unwrap());
        assert_eq!(handle.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_describe_table() {
        let mut conn = MockConnection::mysql().with_table("users", &[("id", "int"), ("name", "varchar(64)")]);
        let mut probe = SchemaProbe::new(&mut conn);

        let columns = probe.describe_table("users").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].data_type, "varchar(64)");
        assert!(columns[1].nullable);

        let err = probe.describe_table("ghosts").await.unwrap_err();
        assert!(matches!(err, MigrateError::Schema(_)));
    }

    #[tokio::test]
    async fn test_show_create_table_mysql() {
        let mut conn = MockConnection::mysql().with_table("users", &[("id", "int")]);
        let mut probe = SchemaProbe::new(&mut conn);

        let ddl = probe.show_create_table("users").await.unwrap();
        assert!(ddl.starts_with("CREATE TABLE `users`"));

        let err = probe.show_create_table("ghosts").await.unwrap_err();
        assert_eq!(err.database_error().unwrap().code.as_deref(), Some("1146"));
    }

    #[tokio::test]
    async fn test_show_create_table_postgres_is_rebuilt() {
        let mut conn = MockConnection::new(DatabaseBackendType::PostgreSQL)
            .with_table("users", &[("id", "integer"), ("email", "character varying(255)")]);
        let mut probe = SchemaProbe::new(&mut conn);

        let ddl = probe.show_create_table("users").await.unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE \"users\" (\n    \"id\" integer,\n    \"email\" character varying(255)\n)"
        );
    }

    #[test]
    fn test_render_create_table_with_constraints() {
        let columns = vec![ColumnInfo {
            name: "id".to_string(),
            data_type: "integer".to_string(),
            nullable: false,
            default: Some("nextval('users_id_seq'::regclass)".to_string()),
        }];
        let ddl = render_create_table(SqlDialect::PostgreSQL, "users", &columns).unwrap();
        assert!(ddl.contains("\"id\" integer NOT NULL DEFAULT nextval('users_id_seq'::regclass)"));
    }
}
