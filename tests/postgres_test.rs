//! Integration tests against a live PostgreSQL server.
//!
//! Run with `cargo test -- --ignored` once the `DB_*` variables point at a
//! scratch database (defaults match a local `postgres:postgres` instance).

mod common;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use query_unit_of_work::drivers::PgConnector;
use query_unit_of_work::{fetch_all, ConnectionConfig, SqlValue, UnitOfWork, UnitOfWorkError};

use common::ValueError;

/// Helper function to get connection settings from environment or use defaults
fn get_config() -> ConnectionConfig {
    ConnectionConfig::from_env()
        .unwrap_or_else(|_| ConnectionConfig::new("localhost", "postgres", "postgres", "test_db", 5432))
}

/// Create the table used by the tests
async fn setup_database(uow: &UnitOfWork<PgConnector>, config: &ConnectionConfig) {
    uow.run(config, |conn| {
        Box::pin(async move {
            fetch_all(conn, "DROP TABLE IF EXISTS uow_numbers").await?;
            fetch_all(
                conn,
                "CREATE TABLE uow_numbers (id INT4 PRIMARY KEY, label TEXT NOT NULL)",
            )
            .await?;
            Ok::<_, UnitOfWorkError>(())
        })
    })
    .await
    .expect("Failed to create uow_numbers table");
}

/// Clean up database after tests
async fn cleanup_database(uow: &UnitOfWork<PgConnector>, config: &ConnectionConfig) {
    uow.run_query(config, "DROP TABLE IF EXISTS uow_numbers")
        .await
        .expect("Failed to drop uow_numbers table");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_commit_persists_rows() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());
    setup_database(&uow, &config).await;

    uow.run(&config, |conn| {
        Box::pin(async move {
            fetch_all(conn, "INSERT INTO uow_numbers VALUES (1, 'one'), (2, 'two')").await
        })
    })
    .await
    .expect("Failed to insert rows");

    let result = uow
        .run_query(&config, "SELECT id, label FROM uow_numbers ORDER BY id")
        .await
        .expect("Failed to read rows");

    assert_eq!(result.columns(), ["id", "label"]);
    assert_eq!(
        result.rows(),
        [
            vec![SqlValue::Int(1), SqlValue::from("one")],
            vec![SqlValue::Int(2), SqlValue::from("two")],
        ]
    );

    cleanup_database(&uow, &config).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_failed_work_is_rolled_back() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());
    setup_database(&uow, &config).await;

    let err = uow
        .run(&config, |conn| {
            Box::pin(async move {
                fetch_all(conn, "INSERT INTO uow_numbers VALUES (3, 'three')")
                    .await
                    .map_err(|e| ValueError(e.to_string()))?;
                Err::<(), _>(ValueError("bad query".to_string()))
            })
        })
        .await
        .expect_err("Work should fail");
    assert_eq!(err.cause_as::<ValueError>().unwrap().0, "bad query");

    let result = uow
        .run_query(&config, "SELECT id FROM uow_numbers")
        .await
        .expect("Failed to count rows");
    assert!(result.is_empty(), "Insert should not survive a rollback");

    cleanup_database(&uow, &config).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_swallowed_statement_error_fails_commit() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());
    setup_database(&uow, &config).await;

    let err = uow
        .run(&config, |conn| {
            Box::pin(async move {
                fetch_all(conn, "INSERT INTO uow_numbers VALUES (4, 'four')").await?;
                let _ = fetch_all(conn, "SELECT * FROM table_that_does_not_exist").await;
                Ok::<_, UnitOfWorkError>(())
            })
        })
        .await
        .expect_err("Commit of an aborted transaction should fail");
    assert!(matches!(err, UnitOfWorkError::Commit(_)));

    let result = uow
        .run_query(&config, "SELECT id FROM uow_numbers")
        .await
        .expect("Failed to count rows");
    assert!(result.is_empty(), "Insert should not survive an aborted transaction");

    cleanup_database(&uow, &config).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_common_column_types_are_decoded() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());

    let result = uow
        .run_query(
            &config,
            r#"SELECT 1.5::NUMERIC, DATE '2024-01-02', now(), '{"a":1}'::JSON, 'x'::"char", 'y'::CHAR(1)"#,
        )
        .await
        .expect("Failed to run query");

    let row = &result.rows()[0];
    assert_eq!(row[0], SqlValue::Decimal(Decimal::new(15, 1)));
    assert_eq!(row[1], SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
    assert!(matches!(row[2], SqlValue::TimestampTz(_)));
    assert_eq!(row[3], SqlValue::Json(serde_json::json!({"a": 1})));
    assert_eq!(row[4], SqlValue::from("x"));
    assert_eq!(row[5], SqlValue::from("y"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_empty_result_keeps_columns() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());

    let result = uow
        .run_query(&config, "SELECT 1::INT8 AS one, NULL::TEXT AS nothing WHERE false")
        .await
        .expect("Failed to run query");

    assert!(result.is_empty());
    assert_eq!(result.columns(), ["one", "nothing"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires a running PostgreSQL server"]
async fn test_invalid_query_surfaces_query_error() {
    let config = get_config();
    let uow = UnitOfWork::new(PgConnector::new());

    let err = uow
        .run_query(&config, "SELECT * FROM table_that_does_not_exist")
        .await
        .expect_err("Query should fail");

    assert!(matches!(
        err.cause_as::<UnitOfWorkError>(),
        Some(UnitOfWorkError::Query { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn test_unreachable_server_is_a_connection_error() {
    // Port 1 is reserved and never runs PostgreSQL.
    let config = ConnectionConfig::new("127.0.0.1", "postgres", "postgres", "test_db", 1);
    let uow = UnitOfWork::new(PgConnector::new());

    let err = uow
        .run_query(&config, "SELECT 1")
        .await
        .expect_err("Connect should fail");

    assert!(matches!(err, UnitOfWorkError::Connection { .. }));
}
