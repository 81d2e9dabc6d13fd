//! Bounded execution of validated SQL.

use tracing::{debug, warn};

use super::GatewayError;
use crate::db::{ConnectionSource, CursorOptions, ResultStream};

/// Opens a cursor for `sql` on `source` within `options.timeout`.
///
/// The text is passed through verbatim; the gateway never binds parameters.
/// Connection acquisition counts against the timeout. Connection release is
/// owned by the source's producer, so an early return here leaks nothing.
pub async fn execute(
    sql: &str,
    source: &dyn ConnectionSource,
    options: &CursorOptions,
) -> Result<ResultStream, GatewayError> {
    debug!(
        backend = source.backend().as_str(),
        fetch_size = options.fetch_size,
        timeout_secs = options.timeout.as_secs(),
        "Opening cursor"
    );

    match tokio::time::timeout(options.timeout, source.open_cursor(sql, options)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Cursor did not open within {:?}", options.timeout);
            Err(GatewayError::timeout(options.timeout))
        }
    }
}
