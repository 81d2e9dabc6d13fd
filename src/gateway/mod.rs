//! Read-only SQL gateway.
//!
//! Accepts free-form SQL from an operator, rejects anything that could write,
//! runs the rest under a timeout on a read-only cursor and returns a capped,
//! uniform result envelope.
//!
//! Pipeline: [`normalize`] -> [`PolicyValidator`] -> [`executor::execute`]
//! -> [`materialize`]. Rejections happen before a connection is touched.

mod envelope;
mod error;
pub mod executor;
mod materialize;
mod normalize;
mod policy;

pub use envelope::{ResultEnvelope, ResultRow};
pub use error::{translate_driver_error, ErrorKind, GatewayError};
pub use materialize::materialize;
pub use normalize::normalize;
pub use policy::{validate, AllowedCommand, PolicyValidator, ALLOWED_COMMANDS, MUTATION_KEYWORDS};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::db::{ConnectionSource, CursorOptions};

/// Stateless entry point; one instance may serve any number of concurrent calls.
#[derive(Clone)]
pub struct SqlGateway {
    source: Arc<dyn ConnectionSource>,
    config: GatewayConfig,
    policy: PolicyValidator,
}

impl SqlGateway {
    /// Creates a gateway over an already configured connection source.
    pub fn new(source: Arc<dyn ConnectionSource>, config: GatewayConfig) -> Self {
        Self {
            source,
            config,
            policy: PolicyValidator::new(),
        }
    }

    /// Returns the limits this gateway enforces.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Runs one operator query.
    ///
    /// A timeout discards any rows read so far; there is no partial result.
    pub async fn execute(&self, raw_sql: Option<&str>) -> Result<ResultEnvelope, GatewayError> {
        let sql = normalize(raw_sql, self.config.max_sql_length).inspect_err(|e| {
            warn!(kind = %e.kind(), "Rejected query input");
        })?;

        let command = self.policy.validate(&sql).inspect_err(|e| {
            warn!(kind = %e.kind(), "Rejected query by policy");
        })?;
        debug!(%command, len = sql.len(), "Query accepted");

        let options = CursorOptions {
            timeout: self.config.query_timeout(),
            fetch_size: self.config.fetch_size,
        };

        let start = Instant::now();
        let run = async {
            let stream = executor::execute(&sql, self.source.as_ref(), &options).await?;
            materialize(stream, self.config.max_rows).await
        };

        let result = match tokio::time::timeout(options.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(options.timeout)),
        };

        match &result {
            Ok(envelope) => info!(
                rows = envelope.row_count,
                truncated = envelope.truncated(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Query completed"
            ),
            Err(e @ GatewayError::QueryTimeout { .. }) => warn!("{e}"),
            Err(e) => debug!(kind = %e.kind(), "Query failed"),
        }

        result
    }

    /// Runs one operator query and wraps the outcome for rendering.
    pub async fn respond(&self, raw_sql: Option<&str>) -> GatewayResponse {
        self.execute(raw_sql).await.into()
    }
}

/// Error part of a [`GatewayResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Flat response shape consumed by the rendering layer.
///
/// Either the result fields are populated and `error` is `None`, or `error`
/// is set and the result fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub row_count: usize,
    pub truncated: bool,
    pub notice: Option<String>,
    pub error: Option<ErrorBody>,
}

impl From<Result<ResultEnvelope, GatewayError>> for GatewayResponse {
    fn from(result: Result<ResultEnvelope, GatewayError>) -> Self {
        match result {
            Ok(envelope) => Self {
                truncated: envelope.truncated(),
                columns: envelope.columns,
                rows: envelope.rows,
                row_count: envelope.row_count,
                notice: envelope.notice,
                error: None,
            },
            Err(e) => Self {
                error: Some(ErrorBody {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
                ..Self::default()
            },
        }
    }
}
