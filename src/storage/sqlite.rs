use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, Transaction, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;

use super::{Row, Storage, StorageTransaction};
use crate::config::OrbisConfig;
use crate::error::{OrbisError, OrbisResult};
use crate::query::Statement;

/// SQLite implementation of the storage interface
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> OrbisResult<Self> {
        let pool = SqlitePool::connect(url).await.map_err(|e| {
            OrbisError::Database(format!("Failed to connect to SQLite at {}: {}", url, e))
        })?;
        Ok(Self { pool })
    }

    pub async fn connect_with(config: &OrbisConfig) -> OrbisResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database.url)
            .map_err(|e| OrbisError::Configuration(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to open SQLite pool: {}", e)))?;

        tracing::info!(url = %config.database.url, "connected to SQLite");
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file.
    pub async fn open_file(path: &Path) -> OrbisResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                OrbisError::Database(format!("Failed to open {}: {}", path.display(), e))
            })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run semicolon-separated DDL or fixture SQL without parameters.
    pub async fn execute_raw(&self, sql: &str) -> OrbisResult<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| OrbisError::Database(format!("Failed to execute raw SQL: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> OrbisResult<Box<dyn StorageTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to begin transaction: {}", e)))?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn fetch_all(&self, statement: &Statement) -> OrbisResult<Vec<Row>> {
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to run query: {}", e)))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> OrbisResult<u64> {
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&self.pool)
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to execute statement: {}", e)))?;
        Ok(result.rows_affected())
    }
}

pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StorageTransaction for SqliteTransaction {
    async fn fetch_all(&mut self, statement: &Statement) -> OrbisResult<Vec<Row>> {
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to run query: {}", e)))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, statement: &Statement) -> OrbisResult<u64> {
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to execute statement: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> OrbisResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> OrbisResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| OrbisError::Database(format!("Failed to rollback transaction: {}", e)))
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> OrbisResult<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index).map_err(|e| {
            OrbisError::Database(format!("Failed to read column {}: {}", column.name(), e))
        })?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" | "NUMERIC" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::String(BASE64.encode(row.try_get_unchecked::<Vec<u8>, _>(index)?)),
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_round_trip_and_decoding() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::open_file(&dir.path().join("storage.db"))
            .await
            .unwrap();
        storage
            .execute_raw(
                "CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT, price REAL, active BOOLEAN, data BLOB);
                 INSERT INTO item (id, name, price, active, data) VALUES (1, 'pen', 1.5, 1, x'0102')",
            )
            .await
            .unwrap();

        let rows = storage
            .fetch_all(&Statement {
                sql: "SELECT * FROM item WHERE id = ?".into(),
                params: vec![json!(1)],
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("pen"));
        assert_eq!(rows[0]["price"], json!(1.5));
        assert_eq!(rows[0]["active"], json!(1));
        assert_eq!(rows[0]["data"], json!("AQI="));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_writes() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::open_file(&dir.path().join("tx.db")).await.unwrap();
        storage
            .execute_raw("CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();

        let mut tx = storage.begin().await.unwrap();
        let affected = tx
            .execute(&Statement {
                sql: "INSERT INTO item (name) VALUES (?)".into(),
                params: vec![json!("pen")],
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);
        tx.rollback().await.unwrap();

        let rows = storage
            .fetch_all(&Statement::new("SELECT * FROM item"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
