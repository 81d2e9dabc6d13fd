//! End-to-end gateway tests against the scripted connection source.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sql_console::config::GatewayConfig;
use sql_console::db::{ColumnMeta, MockSource, Value};
use sql_console::gateway::{ErrorKind, GatewayError, SqlGateway};

fn gateway_over(source: MockSource) -> (SqlGateway, Arc<MockSource>) {
    let source = Arc::new(source);
    let gateway = SqlGateway::new(source.clone(), GatewayConfig::default());
    (gateway, source)
}

/// Scenario: Result larger than the row cap
/// Given a source with more rows than max_rows
/// When a SELECT runs
/// Then exactly max_rows rows are returned
/// And the envelope is marked truncated
#[tokio::test]
async fn test_large_result_is_truncated() {
    let (gateway, _) = gateway_over(MockSource::numbered(5_000));

    let envelope = gateway.execute(Some("SELECT N FROM BIG")).await.unwrap();

    assert_eq!(envelope.row_count, 1_000);
    assert_eq!(envelope.rows.len(), 1_000);
    assert!(envelope.truncated());
    assert_eq!(envelope.notice.as_deref(), Some("Truncated to 1000 rows."));
}

/// Scenario: Result exactly at the row cap
/// Given a source with exactly max_rows rows
/// Then the envelope is marked truncated
#[tokio::test]
async fn test_exactly_cap_rows_reports_truncated() {
    let (gateway, _) = gateway_over(MockSource::numbered(1_000));

    let envelope = gateway.execute(Some("SELECT N FROM T")).await.unwrap();

    assert_eq!(envelope.row_count, 1_000);
    assert!(envelope.truncated());
}

/// Scenario: Result one below the row cap
/// Then all rows are returned without a notice
#[tokio::test]
async fn test_below_cap_is_not_truncated() {
    let (gateway, _) = gateway_over(MockSource::numbered(999));

    let envelope = gateway.execute(Some("SELECT N FROM T")).await.unwrap();

    assert_eq!(envelope.row_count, 999);
    assert!(!envelope.truncated());
    assert!(envelope.notice.is_none());
}

/// Scenario: Rows past the cap are never pulled
/// Given a large result
/// When the cap is reached
/// Then the producer stops within one fetch window of the cap
#[tokio::test]
async fn test_rows_past_cap_are_not_fetched() {
    let (gateway, source) = gateway_over(MockSource::numbered(100_000));
    let config = *gateway.config();

    gateway.execute(Some("SELECT N FROM HUGE")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(source.rows_delivered() <= config.max_rows + config.fetch_size);
}

/// Scenario: Labelled columns appear under both keys
/// Given a column aliased as Total over GESAMTPREIS
/// Then every row exposes the value under "Total" and "GESAMTPREIS"
/// And the header uses the label
#[tokio::test]
async fn test_labelled_columns_have_both_keys() {
    let (gateway, _) = gateway_over(MockSource::sample());

    let envelope = gateway
        .execute(Some("SELECT BESTELLNR, GESAMTPREIS AS Total FROM BESTELLUNG"))
        .await
        .unwrap();

    assert_eq!(
        envelope.columns,
        vec!["BESTELLNR", "Kunde", "Total", "BESTELLDATUM"]
    );
    let first = &envelope.rows[0];
    assert_eq!(first.get("Total"), Some(&Value::Float(71.91)));
    assert_eq!(first.get("GESAMTPREIS"), Some(&Value::Float(71.91)));
    assert_eq!(first.get("BESTELLNR"), Some(&Value::Int(1)));
    assert_eq!(envelope.rows[2].get("BESTELLDATUM"), Some(&Value::Null));
}

/// Scenario: Blank labels fall back to the column name
#[tokio::test]
async fn test_blank_label_uses_name() {
    let source = MockSource::new(
        vec![ColumnMeta::labelled("  ", "PLZ")],
        vec![vec![Value::from("20095")]],
    );
    let (gateway, _) = gateway_over(source);

    let envelope = gateway.execute(Some("SELECT PLZ FROM KUNDE")).await.unwrap();

    assert_eq!(envelope.columns, vec!["PLZ"]);
    assert_eq!(envelope.rows[0].keys().collect::<Vec<_>>(), vec!["PLZ"]);
}

/// Scenario: Slow query
/// Given a source that takes longer than the timeout
/// Then QueryTimeout is returned and no rows escape
#[tokio::test]
async fn test_slow_query_times_out() {
    let source = Arc::new(MockSource::numbered(10).with_open_delay(Duration::from_secs(5)));
    let config = GatewayConfig {
        query_timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let gateway = SqlGateway::new(source, config);

    let err = gateway.execute(Some("SELECT N FROM T")).await.unwrap_err();

    assert_eq!(err, GatewayError::QueryTimeout { seconds: 1 });
    assert_eq!(err.to_string(), "Query timed out after 1s");
}

/// Scenario: Cursor options come from the gateway config
#[tokio::test]
async fn test_cursor_options_follow_config() {
    let (gateway, source) = gateway_over(MockSource::numbered(1));

    gateway.execute(Some("SELECT N FROM T")).await.unwrap();

    let options = source.last_options().unwrap();
    assert_eq!(options.fetch_size, 200);
    assert_eq!(options.timeout, Duration::from_secs(10));
}

/// Scenario: Database error mid-stream
/// Then ExecutionFailed is returned instead of a partial envelope
#[tokio::test]
async fn test_mid_stream_failure_discards_rows() {
    let source = MockSource::numbered(10).with_failure_after(4, GatewayError::execution("disk I/O"));
    let (gateway, _) = gateway_over(source);

    let err = gateway.execute(Some("SELECT N FROM T")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(err.to_string(), "SQL error: disk I/O");
}

/// Scenario: Driver error on open
#[tokio::test]
async fn test_open_failure_is_reported() {
    let source = MockSource::numbered(1)
        .with_failure(GatewayError::execution("relation \"kunde\" does not exist"));
    let (gateway, _) = gateway_over(source);

    let response = gateway.respond(Some("SELECT * FROM kunde")).await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ExecutionFailed);
    assert!(error.message.contains("does not exist"));
}

/// Scenario: Statement terminators
/// Then a single trailing semicolon is accepted
/// And a doubled one is rejected as multiple statements
#[tokio::test]
async fn test_trailing_semicolons() {
    let (gateway, source) = gateway_over(MockSource::numbered(1));

    assert!(gateway.execute(Some("SELECT 1;")).await.is_ok());
    assert_eq!(
        gateway.execute(Some("SELECT 1;;")).await.unwrap_err(),
        GatewayError::MultipleStatements
    );
    assert_eq!(source.executed_sql(), vec!["SELECT 1".to_string()]);
}

/// Scenario: Every allowed command reaches the source
#[tokio::test]
async fn test_allowed_commands_are_executed() {
    let (gateway, source) = gateway_over(MockSource::numbered(1));

    for sql in [
        "select 1",
        "SHOW TABLES",
        "describe KUNDE",
        "EXPLAIN SELECT * FROM KUNDE",
    ] {
        assert!(gateway.execute(Some(sql)).await.is_ok(), "{sql}");
    }
    assert_eq!(source.open_count(), 4);
}

/// Scenario: Many concurrent callers share one gateway
#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let (gateway, source) = gateway_over(MockSource::numbered(1_500));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    gateway.execute(Some("SELECT N FROM T")).await
                } else {
                    gateway.execute(Some("DELETE FROM T")).await
                }
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(result.unwrap().row_count, 1_000);
        } else {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::CommandNotAllowed);
        }
    }
    assert_eq!(source.open_count(), 8);
}
