//! Gateway tests against an in-memory SQLite database.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sql_console::config::GatewayConfig;
use sql_console::db::{SqliteSource, Value};
use sql_console::gateway::{ErrorKind, SqlGateway};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE KUNDE (KUNDENNR INTEGER PRIMARY KEY, NACHNAME TEXT, ORT TEXT)",
        "INSERT INTO KUNDE VALUES (2001, 'Wellensteyn', 'Hamburg'), (2002, 'Foede', 'Hamburg'), (2003, 'Leberer', 'Bremen')",
        "CREATE TABLE ZAHL (N INTEGER)",
        "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 2500) INSERT INTO ZAHL SELECT n FROM seq",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool
}

async fn gateway() -> (SqlGateway, SqlitePool) {
    let pool = memory_pool().await;
    let source = Arc::new(SqliteSource::from_pool(pool.clone()));
    (SqlGateway::new(source, GatewayConfig::default()), pool)
}

/// Scenario: Simple SELECT
/// Then rows come back in order with typed values
#[tokio::test]
async fn test_select_rows() {
    let (gateway, _) = gateway().await;

    let envelope = gateway
        .execute(Some("SELECT KUNDENNR, NACHNAME FROM KUNDE WHERE ORT = 'Hamburg' ORDER BY KUNDENNR;"))
        .await
        .unwrap();

    assert_eq!(envelope.columns, vec!["KUNDENNR", "NACHNAME"]);
    assert_eq!(envelope.row_count, 2);
    assert_eq!(envelope.rows[0].get("KUNDENNR"), Some(&Value::Int(2001)));
    assert_eq!(
        envelope.rows[1].get("NACHNAME"),
        Some(&Value::from("Foede"))
    );
}

/// Scenario: Aliased column
/// Then the alias is the header and the row key
#[tokio::test]
async fn test_alias_is_header() {
    let (gateway, _) = gateway().await;

    let envelope = gateway
        .execute(Some("SELECT NACHNAME AS Kunde FROM KUNDE ORDER BY KUNDENNR LIMIT 1"))
        .await
        .unwrap();

    assert_eq!(envelope.columns, vec!["Kunde"]);
    assert_eq!(
        envelope.rows[0].get("Kunde"),
        Some(&Value::from("Wellensteyn"))
    );
}

/// Scenario: Empty result
/// Then columns are still reported
#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let (gateway, _) = gateway().await;

    let envelope = gateway
        .execute(Some("SELECT KUNDENNR, ORT FROM KUNDE WHERE 1 = 0"))
        .await
        .unwrap();

    assert_eq!(envelope.columns, vec!["KUNDENNR", "ORT"]);
    assert!(envelope.is_empty());
    assert!(!envelope.truncated());
}

/// Scenario: Table larger than the cap
/// Then the result is capped and marked truncated
#[tokio::test]
async fn test_large_table_is_capped() {
    let (gateway, _) = gateway().await;

    let envelope = gateway.execute(Some("SELECT N FROM ZAHL")).await.unwrap();

    assert_eq!(envelope.row_count, 1_000);
    assert!(envelope.truncated());

    // The connection is released once the stream is dropped.
    let again = gateway
        .execute(Some("SELECT COUNT(*) AS total FROM ZAHL"))
        .await
        .unwrap();
    assert_eq!(again.rows[0].get("total"), Some(&Value::Int(2500)));
}

/// Scenario: Rejected writes leave the data untouched
#[tokio::test]
async fn test_rejected_write_changes_nothing() {
    let (gateway, pool) = gateway().await;

    let err = gateway.execute(Some("DELETE FROM KUNDE")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommandNotAllowed);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM KUNDE")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

/// Scenario: Unknown table
/// Then the driver message is passed through as ExecutionFailed
#[tokio::test]
async fn test_unknown_table_is_execution_failure() {
    let (gateway, _) = gateway().await;

    let response = gateway.respond(Some("SELECT * FROM BESTELLUNG")).await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ExecutionFailed);
    assert!(error.message.starts_with("SQL error: "));
    assert!(error.message.contains("BESTELLUNG"));
}

/// Scenario: Runaway query on a single-connection pool
/// Given a query that runs past the timeout
/// When it times out
/// Then the statement is interrupted
/// And the next query gets the connection
#[tokio::test]
async fn test_timed_out_query_releases_connection() {
    let pool = memory_pool().await;
    let config = GatewayConfig {
        query_timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let gateway = SqlGateway::new(Arc::new(SqliteSource::from_pool(pool)), config);

    let err = gateway
        .execute(Some(
            "SELECT COUNT(*) FROM (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000000000) SELECT x FROM c)",
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryTimeout);

    let envelope = gateway.execute(Some("SELECT 1 AS eins")).await.unwrap();
    assert_eq!(envelope.rows[0].get("eins"), Some(&Value::Int(1)));
}
