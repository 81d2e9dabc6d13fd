//! PostgreSQL connection source.
//!
//! Each cursor runs inside its own `READ ONLY` transaction with a
//! transaction-local `statement_timeout`. A producer task owns the
//! transaction; it rolls back and returns the connection to the pool when
//! the rows run out, the consumer goes away, or an error occurs.
//!
//! Column labels come from the prepared statement; the table column behind
//! each label is looked up in `pg_attribute`.

use crate::config::ConnectionConfig;
use crate::db::{
    ColumnMeta, ConnectionSource, CursorOptions, DatabaseBackend, ResultStream, Row, RowSender,
    Value,
};
use crate::error::{ConsoleError, Result};
use crate::gateway::{translate_driver_error, GatewayError};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgColumn, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Postgres, Row as SqlxRow, Statement, Transaction};
use sqlx::{TypeInfo, ValueRef};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL connection source backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    /// Creates a source from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database, retrying transient failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&config.url)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => ConsoleError::internal("no connection attempt was made"),
        })
    }
}

#[async_trait]
impl ConnectionSource for PostgresSource {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn open_cursor(
        &self,
        sql: &str,
        options: &CursorOptions,
    ) -> std::result::Result<ResultStream, GatewayError> {
        let limit = options.timeout;
        let driver_error = |e: sqlx::Error| translate_driver_error(e, limit);

        let mut tx = self.pool.begin().await.map_err(driver_error)?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(driver_error)?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            limit.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(driver_error)?;

        let described = (&mut *tx)
            .prepare(sql)
            .await
            .map_err(driver_error)?
            .columns()
            .to_vec();
        let columns = resolve_columns(&mut tx, &described)
            .await
            .map_err(driver_error)?;

        let (sender, stream) = ResultStream::channel(columns, options.fetch_size);
        tokio::spawn(stream_rows(tx, sql.to_string(), sender, limit));
        Ok(stream)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Builds column metadata, pairing each result label with the name of the
/// table column it reads from. Expression columns keep the label only.
async fn resolve_columns(
    tx: &mut Transaction<'static, Postgres>,
    described: &[PgColumn],
) -> std::result::Result<Vec<ColumnMeta>, sqlx::Error> {
    let mut relations = Vec::new();
    let mut attributes = Vec::new();
    let mut positions = Vec::new();
    for (position, column) in described.iter().enumerate() {
        if let (Some(relation), Some(attribute)) =
            (column.relation_id(), column.relation_attribute_no())
        {
            relations.push(relation);
            attributes.push(attribute);
            positions.push(position as i32);
        }
    }

    let mut names: Vec<Option<String>> = vec![None; described.len()];
    if !positions.is_empty() {
        let rows: Vec<(i32, String)> = sqlx::query_as(
            "SELECT c.position, a.attname::text \
             FROM unnest($1::oid[], $2::int2[], $3::int4[]) AS c(relation, attribute, position) \
             JOIN pg_catalog.pg_attribute a \
               ON a.attrelid = c.relation AND a.attnum = c.attribute",
        )
        .bind(relations)
        .bind(attributes)
        .bind(positions)
        .fetch_all(&mut **tx)
        .await?;

        for (position, name) in rows {
            if let Some(slot) = names.get_mut(position as usize) {
                *slot = Some(name);
            }
        }
    }

    Ok(described
        .iter()
        .zip(names)
        .map(|(column, name)| match name {
            Some(name) => ColumnMeta::labelled(column.name(), name),
            None => ColumnMeta::new(column.name()),
        })
        .collect())
}

/// Pushes rows into `sender` until exhausted, failed, or no longer wanted.
async fn stream_rows(
    mut tx: Transaction<'static, Postgres>,
    sql: String,
    sender: RowSender,
    limit: Duration,
) {
    let mut delivered = 0usize;
    {
        let mut rows = sqlx::query(&sql).fetch(&mut *tx);
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
            delivered += 1;
        }
    }

    debug!(delivered, "Cursor finished");
    if let Err(e) = tx.rollback().await {
        debug!("Rollback after read-only cursor failed: {e}");
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow, decoding by type name.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value.map(Value::String).unwrap_or(Value::Null),
            Err(_) => undecodable(row, index, type_name),
        },
    }
}

/// Placeholder for values whose type has no text decoding (NUMERIC, DATE, ...).
fn undecodable(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => Value::Null,
        _ => Value::String(format!("<{}>", type_name.to_lowercase())),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> ConsoleError {
    let target = config.display_string();
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        ConsoleError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        ConsoleError::connection(format!(
            "Authentication failed for {target}. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        ConsoleError::connection(format!("Database for {target} does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        ConsoleError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        ConsoleError::connection(error.to_string())
    }
}
