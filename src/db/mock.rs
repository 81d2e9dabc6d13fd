//! Scripted connection source for tests and offline demos.
//!
//! Serves a fixed set of columns and rows through the same bounded channel
//! the real sources use, and records what it was asked to run.

use super::{
    ColumnMeta, ConnectionSource, CursorOptions, DatabaseBackend, ResultStream, Row, Value,
};
use crate::gateway::GatewayError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A connection source that replays predefined results.
#[derive(Debug, Default)]
pub struct MockSource {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
    open_delay: Option<Duration>,
    row_delay: Option<Duration>,
    failure: Option<GatewayError>,
    fail_after: Option<(usize, GatewayError)>,
    executed: Mutex<Vec<String>>,
    last_options: Mutex<Option<CursorOptions>>,
    rows_delivered: Arc<AtomicUsize>,
}

impl MockSource {
    /// Creates a source returning `rows` under `columns` for every query.
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Creates a source with `count` generated rows in a single `N` column.
    pub fn numbered(count: usize) -> Self {
        let rows = (0..count).map(|i| vec![Value::Int(i as i64)]).collect();
        Self::new(vec![ColumnMeta::new("N")], rows)
    }

    /// Sample order data used by `--mock-db`.
    pub fn sample() -> Self {
        let columns = vec![
            ColumnMeta::new("BESTELLNR"),
            ColumnMeta::labelled("Kunde", "NACHNAME"),
            ColumnMeta::labelled("Total", "GESAMTPREIS"),
            ColumnMeta::new("BESTELLDATUM"),
        ];
        let rows = vec![
            vec![
                Value::Int(1),
                Value::from("Wellensteyn"),
                Value::Float(71.91),
                Value::from("2020-07-01"),
            ],
            vec![
                Value::Int(2),
                Value::from("Foede"),
                Value::Float(8.45),
                Value::from("2020-07-08"),
            ],
            vec![
                Value::Int(3),
                Value::from("Leberer"),
                Value::Float(12.0),
                Value::Null,
            ],
        ];
        Self::new(columns, rows)
    }

    /// Delays opening the cursor, simulating pool exhaustion or a slow server.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Delays every row, simulating a slow scan.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    /// Fails every cursor open with `error`.
    pub fn with_failure(mut self, error: GatewayError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Fails the cursor with `error` after `rows` rows were produced.
    pub fn with_failure_after(mut self, rows: usize, error: GatewayError) -> Self {
        self.fail_after = Some((rows, error));
        self
    }

    /// Number of cursors opened so far.
    pub fn open_count(&self) -> usize {
        self.executed.lock().map(|sql| sql.len()).unwrap_or_default()
    }

    /// SQL texts received, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|sql| sql.clone())
            .unwrap_or_default()
    }

    /// Options passed with the most recent cursor.
    pub fn last_options(&self) -> Option<CursorOptions> {
        self.last_options.lock().ok().and_then(|options| *options)
    }

    /// Rows accepted by consumers' buffers across all cursors.
    pub fn rows_delivered(&self) -> usize {
        self.rows_delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionSource for MockSource {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn open_cursor(
        &self,
        sql: &str,
        options: &CursorOptions,
    ) -> Result<ResultStream, GatewayError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        if let Ok(mut last) = self.last_options.lock() {
            *last = Some(*options);
        }

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (sender, stream) = ResultStream::channel(self.columns.clone(), options.fetch_size);
        let rows = self.rows.clone();
        let row_delay = self.row_delay;
        let fail_after = self.fail_after.clone();
        let delivered = Arc::clone(&self.rows_delivered);

        tokio::spawn(async move {
            for (index, row) in rows.into_iter().enumerate() {
                if let Some((limit, error)) = &fail_after {
                    if index == *limit {
                        let _ = sender.send(Err(error.clone())).await;
                        return;
                    }
                }
                if let Some(delay) = row_delay {
                    tokio::time::sleep(delay).await;
                }
                if sender.send(Ok(row)).await.is_err() {
                    return;
                }
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        });

        Ok(stream)
    }

    async fn close(&self) {}
}
