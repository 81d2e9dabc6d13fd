//! Connection sources for the SQL console.
//!
//! Provides a trait-based interface for opening read-only, forward-only
//! cursors, allowing different database backends to be used interchangeably
//! by the gateway.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::MockSource;
pub use postgres::PostgresSource;
pub use sqlite::SqliteSource;
pub use types::{ColumnMeta, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::gateway::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for logs and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a connection URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Per-call cursor settings handed to a connection source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    /// Server/driver level statement timeout.
    pub timeout: Duration,

    /// Number of rows buffered ahead of the consumer.
    pub fetch_size: usize,
}

/// Outcome of pulling one row from a cursor.
pub type RowResult = std::result::Result<Row, GatewayError>;

/// Producer half of a cursor, owned by the task that holds the connection.
pub type RowSender = mpsc::Sender<RowResult>;

/// A forward-only stream of rows with the column metadata read up front.
///
/// Dropping the stream signals the producer to stop fetching and release
/// its connection.
#[derive(Debug)]
pub struct ResultStream {
    columns: Vec<ColumnMeta>,
    rows: mpsc::Receiver<RowResult>,
}

impl ResultStream {
    /// Creates a stream and the sender its producer writes to.
    ///
    /// The channel holds at most `fetch_size` rows, so a producer can never
    /// run further ahead of the consumer than the fetch-size hint.
    pub fn channel(columns: Vec<ColumnMeta>, fetch_size: usize) -> (RowSender, Self) {
        let (sender, rows) = mpsc::channel(fetch_size.max(1));
        (sender, Self { columns, rows })
    }

    /// Column metadata in physical result order.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Pulls the next row, or `None` once the cursor is exhausted.
    pub async fn next_row(&mut self) -> Option<RowResult> {
        self.rows.recv().await
    }
}

/// Creates a connection source for the given configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn ConnectionSource>> {
    match config.backend()? {
        DatabaseBackend::Postgres => {
            let source = PostgresSource::connect(config).await?;
            Ok(Arc::new(source))
        }
        DatabaseBackend::Sqlite => {
            let source = SqliteSource::connect(config).await?;
            Ok(Arc::new(source))
        }
    }
}

/// Trait defining the interface for relational connection sources.
///
/// Implementations acquire one connection per cursor and release it when the
/// producing side finishes, whichever way it finishes.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Returns the backend this source talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Opens a read-only, forward-only cursor over `sql`, executed verbatim.
    async fn open_cursor(
        &self,
        sql: &str,
        options: &CursorOptions,
    ) -> std::result::Result<ResultStream, GatewayError>;

    /// Closes the underlying pool.
    async fn close(&self);
}
