//! Result normalization: turns a cursor into a capped envelope.

use tracing::debug;

use super::{GatewayError, ResultEnvelope, ResultRow};
use crate::db::ResultStream;

/// Reads at most `row_cap` rows from `stream` into an envelope.
///
/// Stops pulling as soon as the cap is reached; the stream is dropped on
/// return, which tells the producer to stop fetching. A row error aborts the
/// whole envelope.
pub async fn materialize(
    mut stream: ResultStream,
    row_cap: usize,
) -> Result<ResultEnvelope, GatewayError> {
    let metadata = stream.columns().to_vec();
    let columns: Vec<String> = metadata
        .iter()
        .map(|column| column.display_name().to_string())
        .collect();

    let mut rows = Vec::new();
    while rows.len() < row_cap {
        match stream.next_row().await {
            Some(Ok(values)) => rows.push(ResultRow::from_values(&metadata, values)),
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    debug!(rows = rows.len(), row_cap, "Materialized result");
    Ok(ResultEnvelope::new(columns, rows, row_cap))
}
