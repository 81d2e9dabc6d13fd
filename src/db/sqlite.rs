//! SQLite connection source.
//!
//! Switches each acquired connection to `query_only` and arms a progress
//! handler that interrupts the statement once the timeout has passed, then
//! streams rows from a task that owns the connection.

use crate::config::ConnectionConfig;
use crate::db::{
    ColumnMeta, ConnectionSource, CursorOptions, DatabaseBackend, ResultStream, Row, RowSender,
    Value,
};
use crate::error::{ConsoleError, Result};
use crate::gateway::{translate_driver_error, GatewayError};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Sqlite, Statement};
use sqlx::{TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::debug;

/// VM instructions between progress handler checks.
const PROGRESS_HANDLER_OPS: i32 = 1000;

/// SQLite connection source backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Creates a source from an existing connection pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the configured database file.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url)
            .await
            .map_err(|e| {
                ConsoleError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;
        debug!("Opened {}", config.display_string());
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConnectionSource for SqliteSource {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn open_cursor(
        &self,
        sql: &str,
        options: &CursorOptions,
    ) -> std::result::Result<ResultStream, GatewayError> {
        let limit = options.timeout;
        let driver_error = |e: sqlx::Error| translate_driver_error(e, limit);

        let mut conn = self.pool.acquire().await.map_err(driver_error)?;
        install_progress_handler(&mut conn, Instant::now() + limit)
            .await
            .map_err(driver_error)?;

        let prepared = async {
            sqlx::query("PRAGMA query_only = ON")
                .execute(&mut *conn)
                .await?;
            let statement = (&mut *conn).prepare(sql).await?;
            Ok::<_, sqlx::Error>(
                statement
                    .columns()
                    .iter()
                    .map(|column| ColumnMeta::new(column.name()))
                    .collect::<Vec<_>>(),
            )
        }
        .await;

        let columns = match prepared {
            Ok(columns) => columns,
            Err(e) => {
                clear_progress_handler(&mut conn).await;
                return Err(driver_error(e));
            }
        };

        let (sender, stream) = ResultStream::channel(columns, options.fetch_size);
        tokio::spawn(stream_rows(conn, sql.to_string(), sender, limit));
        Ok(stream)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Pushes rows into `sender` until exhausted, failed, or no longer wanted.
async fn stream_rows(
    mut conn: PoolConnection<Sqlite>,
    sql: String,
    sender: RowSender,
    limit: Duration,
) {
    {
        let mut rows = sqlx::query(&sql).fetch(&mut *conn);
        loop {
            let next = tokio::select! {
                _ = sender.closed() => break,
                next = rows.next() => next,
            };
            let Some(next) = next else { break };

            let item = next
                .map(|row| convert_row(&row))
                .map_err(|e| translate_driver_error(e, limit));
            let failed = item.is_err();
            if sender.send(item).await.is_err() || failed {
                break;
            }
        }
    }

    clear_progress_handler(&mut conn).await;
}

/// Interrupts any statement on `conn` still running after `deadline`.
async fn install_progress_handler(
    conn: &mut SqliteConnection,
    deadline: Instant,
) -> std::result::Result<(), sqlx::Error> {
    let mut handle = conn.lock_handle().await?;
    handle.set_progress_handler(PROGRESS_HANDLER_OPS, move || Instant::now() < deadline);
    Ok(())
}

/// Removes the deadline before the connection goes back to the pool.
async fn clear_progress_handler(conn: &mut SqliteConnection) {
    match conn.lock_handle().await {
        Ok(mut handle) => handle.remove_progress_handler(),
        Err(e) => debug!("Could not clear progress handler: {e}"),
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|index| convert_value(row, index))
        .collect()
}

/// Converts a value by its storage class; SQLite types are per value, not per column.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
