//! End-to-end runs against in-memory databases.

mod common;

use std::sync::Arc;

use common::*;
use etlpipe::core::{DbKind, SqlValue};
use etlpipe::{Dataset, LoadMode, NullPolicy, Orchestrator, RunStage, RunStatus};

fn orchestrator(config: etlpipe::Config, provider: MemoryProvider) -> Orchestrator {
    Orchestrator::with_provider(config, Arc::new(provider))
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_query_run_loads_deduplicated_rows() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert!(result.is_success(), "details: {}", result.details);
    assert_eq!(result.final_stage, RunStage::Completed);
    assert_eq!(result.process_name, "ETL_Oracle_orders_to_Postgresql_orders");
    assert_eq!(result.rows_extracted, 3);
    assert_eq!(result.rows_loaded, 2);
    assert!(result
        .details
        .starts_with("ETL process completed successfully in"));

    let table = dest.table("orders").unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][0], SqlValue::Int(1));
    assert_eq!(table.rows[1][1], SqlValue::Text("beta".into()));
}

#[tokio::test]
async fn test_projection_follows_destination_order() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = MemoryDatabase::new(DbKind::Postgres).with_table(
        "orders",
        &[("name", "text"), ("id", "integer")],
    );
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert!(result.is_success(), "details: {}", result.details);
    let table = dest.table("orders").unwrap();
    assert_eq!(
        table.rows[0],
        vec![SqlValue::Text("alpha".into()), SqlValue::Int(1)]
    );
}

#[tokio::test]
async fn test_drop_policy_removes_rows_with_nulls() {
    let data = Dataset::from_rows(
        vec!["id".into(), "name".into()],
        vec![
            vec![SqlValue::Int(1), "alpha".into()],
            vec![SqlValue::Int(2), SqlValue::Null],
        ],
    );
    let sql = "SELECT id, name FROM orders";
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(sql, data);
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(sql), provider).run().await;

    assert!(result.is_success(), "details: {}", result.details);
    assert_eq!(result.rows_loaded, 1);
}

#[tokio::test]
async fn test_fill_policy_keeps_rows_with_defaults() {
    let data = Dataset::from_rows(
        vec!["id".into(), "name".into()],
        vec![
            vec![SqlValue::Int(1), "alpha".into()],
            vec![SqlValue::Int(2), SqlValue::Null],
        ],
    );
    let sql = "SELECT id, name FROM orders";
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(sql, data);
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let mut config = query_config(sql);
    config.transform.null_policy = NullPolicy::Fill;
    let result = orchestrator(config, provider).run().await;

    assert!(result.is_success(), "details: {}", result.details);
    let table = dest.table("orders").unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][1], SqlValue::Text(String::new()));
}

#[tokio::test]
async fn test_truncate_mode_replaces_existing_rows() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let mut config = query_config(ORDERS_QUERY);
    config.destination.load_mode = Some(LoadMode::Truncate);
    let orch = orchestrator(config, provider);

    assert!(orch.run().await.is_success());
    assert!(orch.run().await.is_success());

    assert_eq!(dest.truncates(), 2);
    assert_eq!(dest.table("orders").unwrap().rows.len(), 2);
}

#[tokio::test]
async fn test_csv_file_creates_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.csv");
    std::fs::write(
        &path,
        "Customer Id,Full Name,Balance\n1,Ada Lovelace,10.5\n2,Alan Turing,3\n",
    )
    .unwrap();

    let audit = MemoryDatabase::new(DbKind::Oracle);
    let dest = MemoryDatabase::new(DbKind::Postgres);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(file_config(&path, "customers"), provider)
        .run()
        .await;

    assert!(result.is_success(), "details: {}", result.details);
    assert_eq!(result.process_name, "ETL_Csv_customers_to_Postgresql");
    assert_eq!(result.rows_loaded, 2);

    let table = dest.table("customers").unwrap();
    let names: Vec<&str> = table.columns.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["customer_id", "full_name", "balance"]);
    assert_eq!(table.rows[1][2], SqlValue::Float(3.0));
}

// ============================================================================
// Failed runs
// ============================================================================

#[tokio::test]
async fn test_empty_source_fails_at_extraction() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle)
        .with_query(ORDERS_QUERY, Dataset::from_rows(vec!["id".into()], vec![]));
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::Extracting);
    assert_eq!(result.details, "Source data extraction failed or is empty");
    assert!(dest.table("orders").unwrap().rows.is_empty());

    let rows = audit.audit_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, RunStatus::Failed);
    assert_eq!(rows[0].details, "Source data extraction failed or is empty");
}

#[tokio::test]
async fn test_type_mismatch_blocks_load() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = MemoryDatabase::new(DbKind::Postgres).with_table(
        "orders",
        &[
            ("id", "bigint"),
            ("name", "character varying"),
            ("created_at", "character varying"),
        ],
    );
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::TypeCheck);
    assert_eq!(result.details, "Data type mismatch");
    assert_eq!(result.mismatches.len(), 1);
    assert_eq!(result.mismatches[0].column, "created_at");
    assert_eq!(result.mismatches[0].source_type, "datetime64");
    assert!(dest.table("orders").unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_append_to_unknown_table_is_schema_error() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = MemoryDatabase::new(DbKind::Postgres);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::SchemaCheck);
    assert!(result.details.starts_with("ETL process failed: Schema error"));
    assert!(dest.table("orders").is_none());
    assert_eq!(audit.audit_rows()[0].details, result.details);
}

#[tokio::test]
async fn test_existing_table_without_metadata_is_schema_error() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = orders_destination();
    dest.update(|s| s.fail_catalog = true);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let mut config = query_config(ORDERS_QUERY);
    config.destination.load_mode = Some(LoadMode::Truncate);
    let result = orchestrator(config, provider).run().await;

    assert_eq!(result.final_stage, RunStage::SchemaCheck);
    assert!(result.details.contains("No column metadata"));
    assert_eq!(dest.truncates(), 0);
    assert!(dest.table("orders").unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_unreachable_destination_is_connection_error() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_unreachable(DEST_HOST);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::Started);
    assert_eq!(result.details, "Connection error");
    assert_eq!(audit.audit_rows()[0].details, "Connection error");
}

#[tokio::test]
async fn test_load_failure_records_error_text() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = orders_destination();
    dest.update(|s| s.fail_insert = true);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::Loading);
    assert!(result.details.starts_with("ETL process failed:"));
    assert!(result.details.contains("disk full"));
}

#[tokio::test]
async fn test_panic_during_load_is_recorded() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let source = MemoryDatabase::new(DbKind::Oracle).with_query(ORDERS_QUERY, orders_dataset());
    let dest = orders_destination();
    dest.update(|s| s.panic_on_insert = true);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(SOURCE_HOST, &source)
        .with_database(DEST_HOST, &dest);

    let result = orchestrator(query_config(ORDERS_QUERY), provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.details, "ETL process failed: insert exploded");
    let rows = audit.audit_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, RunStatus::Failed);
    assert!(rows[0].end_time.is_some());
}

#[tokio::test]
async fn test_missing_file_is_extraction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let dest = MemoryDatabase::new(DbKind::Postgres);
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_database(DEST_HOST, &dest);

    let config = file_config(&dir.path().join("absent.csv"), "customers");
    let result = orchestrator(config, provider).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.final_stage, RunStage::Extracting);
    assert_eq!(result.details, "Source data extraction failed or is empty");
    assert!(dest.table("customers").is_none());
}

// ============================================================================
// Maintenance operations
// ============================================================================

#[tokio::test]
async fn test_health_check_reports_each_endpoint() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let dest = orders_destination();
    let provider = MemoryProvider::new()
        .with_database(AUDIT_HOST, &audit)
        .with_unreachable(SOURCE_HOST)
        .with_database(DEST_HOST, &dest);

    let health = orchestrator(query_config(ORDERS_QUERY), provider)
        .health_check()
        .await;

    assert_eq!(health.len(), 3);
    let unhealthy: Vec<&str> = health
        .iter()
        .filter(|h| !h.healthy)
        .map(|h| h.host.as_str())
        .collect();
    assert_eq!(unhealthy, vec![SOURCE_HOST]);
}

#[tokio::test]
async fn test_init_audit_creates_table_once() {
    let audit = MemoryDatabase::new(DbKind::Oracle);
    let provider = MemoryProvider::new().with_database(AUDIT_HOST, &audit);
    let orch = orchestrator(query_config(ORDERS_QUERY), provider);

    assert!(orch.init_audit().await.unwrap());
    assert!(!orch.init_audit().await.unwrap());
}

#[tokio::test]
async fn test_destination_schema_reads_catalog() {
    let dest = orders_destination();
    let provider = MemoryProvider::new().with_database(DEST_HOST, &dest);

    let map = orchestrator(query_config(ORDERS_QUERY), provider)
        .destination_schema()
        .await
        .unwrap();

    assert_eq!(map.column_names(), vec!["id", "name", "created_at"]);
    assert_eq!(map.get("CREATED_AT"), Some("timestamp without time zone"));
}
