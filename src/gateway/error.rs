//! Error kinds surfaced by a gateway call.
//!
//! Every failure of normalization, policy validation or execution ends up
//! as exactly one [`GatewayError`] variant. Driver failures are translated
//! here, once, at the execution boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Postgres SQLSTATE raised when `statement_timeout` cancels a statement.
const PG_QUERY_CANCELED: &str = "57014";

/// SQLite result code when a progress handler interrupts a statement.
const SQLITE_INTERRUPT: &str = "9";

/// Failure of a single gateway call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Trimmed input is longer than the configured maximum.
    #[error("SQL too long (limit is {max} characters)")]
    InputTooLong { max: usize },

    /// A statement separator appears in the normalized text.
    #[error("Multiple statements are not allowed")]
    MultipleStatements,

    /// The text does not start with an allowed read-only command.
    #[error("Only SELECT/SHOW/DESCRIBE/EXPLAIN are allowed")]
    CommandNotAllowed,

    /// A write or DDL keyword appears as a whole word.
    #[error("Write or DDL statements are not allowed (found {keyword})")]
    MutationKeywordPresent { keyword: String },

    /// The query did not finish within the configured timeout.
    #[error("Query timed out after {seconds}s")]
    QueryTimeout { seconds: u64 },

    /// The driver or server reported an error; the message is passed through.
    #[error("SQL error: {message}")]
    ExecutionFailed { message: String },
}

/// Machine-readable name of a [`GatewayError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InputTooLong,
    MultipleStatements,
    CommandNotAllowed,
    MutationKeywordPresent,
    QueryTimeout,
    ExecutionFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputTooLong => "InputTooLong",
            Self::MultipleStatements => "MultipleStatements",
            Self::CommandNotAllowed => "CommandNotAllowed",
            Self::MutationKeywordPresent => "MutationKeywordPresent",
            Self::QueryTimeout => "QueryTimeout",
            Self::ExecutionFailed => "ExecutionFailed",
        };
        f.write_str(name)
    }
}

impl GatewayError {
    /// Creates a timeout error for the given limit.
    pub fn timeout(limit: Duration) -> Self {
        Self::QueryTimeout {
            seconds: limit.as_secs(),
        }
    }

    /// Creates an execution error carrying the driver message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Returns the variant's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputTooLong { .. } => ErrorKind::InputTooLong,
            Self::MultipleStatements => ErrorKind::MultipleStatements,
            Self::CommandNotAllowed => ErrorKind::CommandNotAllowed,
            Self::MutationKeywordPresent { .. } => ErrorKind::MutationKeywordPresent,
            Self::QueryTimeout { .. } => ErrorKind::QueryTimeout,
            Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
        }
    }
}

/// Translates a driver error raised while running a statement.
///
/// `limit` is the timeout in force, reported back when the server cancelled
/// the statement for running too long.
pub fn translate_driver_error(error: sqlx::Error, limit: Duration) -> GatewayError {
    if let Some(db_error) = error.as_database_error() {
        if matches!(
            db_error.code().as_deref(),
            Some(PG_QUERY_CANCELED | SQLITE_INTERRUPT)
        ) {
            return GatewayError::timeout(limit);
        }
    }
    GatewayError::execution(format_driver_message(&error))
}

/// Formats a driver error with the server's detail and hint when available.
fn format_driver_message(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            message.push_str("\n  DETAIL: ");
            message.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            message.push_str("\n  HINT: ");
            message.push_str(hint);
        }
    }

    message
}
