//! MySQL adapter.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column as _, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use sqlrag_core::{
    Column, DatabaseConfig, Execution, ForeignKey, Result, RowRecord, SchemaSource, SqlExecutor,
    SqlRagError, TableSchema,
};

/// MySQL-backed schema source and executor.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    config: DatabaseConfig,
}

impl MySqlDatabase {
    /// Create an adapter for the configured database. Nothing connects yet.
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Configured database (schema) name.
    pub fn database_name(&self) -> &str {
        &self.config.name
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.name)
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        MySqlConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                SqlRagError::database(format!(
                    "Failed to connect to {}:{}/{}: {}",
                    self.config.host, self.config.port, self.config.name, e
                ))
            })
    }
}

async fn close(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close database connection: {}", e);
    }
}

#[async_trait]
impl SchemaSource for MySqlDatabase {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;

        let rows = sqlx::query(
            r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.config.name)
        .fetch_all(&mut conn)
        .await;
        close(conn).await;

        let rows = rows.map_err(|e| SqlRagError::database(format!("Failed to list tables: {}", e)))?;
        let tables = rows
            .iter()
            .map(|row| text_column(row, 0))
            .collect::<Result<Vec<_>>>()?;

        info!("Found {} tables in {}", tables.len(), self.config.name);
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let mut conn = self.connect().await?;

        let columns = sqlx::query(
            r#"
            SELECT COLUMN_NAME, COLUMN_TYPE, COLUMN_KEY, IS_NULLABLE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(&self.config.name)
        .bind(table)
        .fetch_all(&mut conn)
        .await;

        let foreign_keys = match columns {
            Ok(_) => {
                sqlx::query(
                    r#"
                    SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
                    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
                    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                      AND REFERENCED_TABLE_NAME IS NOT NULL
                    ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
                    "#,
                )
                .bind(&self.config.name)
                .bind(table)
                .fetch_all(&mut conn)
                .await
            }
            Err(_) => Ok(Vec::new()),
        };
        close(conn).await;

        let columns = columns
            .map_err(|e| SqlRagError::database(format!("Failed to describe {}: {}", table, e)))?;
        let foreign_keys = foreign_keys.map_err(|e| {
            SqlRagError::database(format!("Failed to read foreign keys of {}: {}", table, e))
        })?;

        if columns.is_empty() {
            return Err(SqlRagError::TableNotFound {
                name: table.to_string(),
            });
        }

        let columns = columns
            .iter()
            .map(|row| {
                Ok(Column::new(
                    &text_column(row, 0)?,
                    &text_column(row, 1)?,
                    text_column(row, 2)? == "PRI",
                    text_column(row, 3)? == "YES",
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let foreign_keys = foreign_keys
            .iter()
            .map(|row| {
                Ok(ForeignKey::new(
                    &text_column(row, 0)?,
                    &text_column(row, 1)?,
                    &text_column(row, 2)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Described {}: {} columns, {} foreign keys",
            table,
            columns.len(),
            foreign_keys.len()
        );
        Ok(TableSchema::new(table, columns, foreign_keys))
    }
}

#[async_trait]
impl SqlExecutor for MySqlDatabase {
    async fn execute(&self, sql: &str) -> Result<Execution> {
        let mut conn = self.connect().await?;

        debug!("Executing: {}", sql);
        let result = sqlx::Executor::fetch_all(&mut conn, sqlx::raw_sql(sql)).await;
        close(conn).await;

        match result {
            Ok(rows) => {
                let records: Vec<RowRecord> = rows.iter().map(row_to_record).collect();
                info!("Statement returned {} rows", records.len());
                Ok(Execution::Rows(records))
            }
            Err(e) => {
                warn!("Statement failed: {}", e);
                Ok(Execution::failed(e.to_string()))
            }
        }
    }
}

/// Read a metadata column as text. INFORMATION_SCHEMA columns may come back
/// as binary strings depending on server version, so the type check is
/// skipped.
fn text_column(row: &MySqlRow, index: usize) -> Result<String> {
    row.try_get_unchecked::<String, _>(index)
        .map_err(|e| SqlRagError::database(format!("Unreadable metadata column: {}", e)))
}

fn row_to_record(row: &MySqlRow) -> RowRecord {
    let mut record = RowRecord::new();

    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_string();
        let value = match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(_) => match row.try_get_unchecked::<String, _>(index) {
                Ok(text) => json_value(&type_name, text),
                Err(_) => row
                    .try_get_unchecked::<Vec<u8>, _>(index)
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
                    .unwrap_or(Value::Null),
            },
            Err(_) => Value::Null,
        };
        record.push(column.name(), value);
    }

    record
}

/// Map a text-protocol value to JSON. Integers and floats become numbers;
/// everything else, including DECIMAL and temporal types, stays a string.
fn json_value(type_name: &str, text: String) -> Value {
    let base = type_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match base.as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR"
        | "BOOLEAN" => {
            if let Ok(v) = text.parse::<i64>() {
                return Value::from(v);
            }
            if let Ok(v) = text.parse::<u64>() {
                return Value::from(v);
            }
            Value::String(text)
        }
        "FLOAT" | "DOUBLE" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}
