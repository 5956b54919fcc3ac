//! SQL generated by the default `Connection` methods.
//!
//! `RecordingConnection` implements only `query` and `execute` and logs every
//! call, so these tests see exactly what a real driver would be sent: audit
//! upserts per dialect, INSERT chunking, and the transaction around a load.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use etlpipe::core::{
    AuditEntry, Column, ColumnType, Connection, Dataset, DbKind, Dialect, RunStatus, SqlValue,
};
use etlpipe::drivers::DialectImpl;
use etlpipe::load::load;
use etlpipe::{AuditLogger, EtlError, LoadMode, Result};

/// One call seen by the connection.
#[derive(Debug, Clone, PartialEq)]
struct Call {
    query: bool,
    sql: String,
    params: Vec<SqlValue>,
}

impl Call {
    fn keyword(&self) -> &str {
        self.sql.split_whitespace().next().unwrap_or_default()
    }
}

#[derive(Default)]
struct Log {
    calls: Vec<Call>,
    counts: VecDeque<i64>,
    inserts: usize,
}

struct RecordingConnection {
    kind: DbKind,
    dialect: DialectImpl,
    fail_insert: Option<usize>,
    log: Mutex<Log>,
}

impl RecordingConnection {
    fn new(kind: DbKind) -> Self {
        Self {
            kind,
            dialect: DialectImpl::for_kind(kind),
            fail_insert: None,
            log: Mutex::new(Log::default()),
        }
    }

    /// Answer successive COUNT(*) queries with these values, then 0.
    fn with_counts(self, counts: &[i64]) -> Self {
        self.log.lock().unwrap().counts = counts.iter().copied().collect();
        self
    }

    /// Fail the `n`th INSERT (1-based).
    fn failing_insert(mut self, n: usize) -> Self {
        self.fail_insert = Some(n);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    fn keywords(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.keyword().to_string()).collect()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn kind(&self) -> DbKind {
        self.kind
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(Call {
            query: true,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let count = log.counts.pop_front().unwrap_or(0);
        let mut data = Dataset::new(vec![Column::new("count", ColumnType::Integer)]);
        data.rows.push(vec![SqlValue::Int(count)]);
        Ok(data)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(Call {
            query: false,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if sql.starts_with("INSERT") {
            log.inserts += 1;
            if self.fail_insert == Some(log.inserts) {
                return Err(EtlError::Schema("duplicate key value".into()));
            }
        }
        Ok(1)
    }
}

fn entry(status: RunStatus) -> AuditEntry {
    let start = NaiveDateTime::parse_from_str("2024-03-01 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    AuditEntry {
        process_name: "ETL_Oracle_orders_to_Postgresql_orders".into(),
        status,
        details: match status {
            RunStatus::Started => "ETL process initiated".into(),
            _ => "ETL process completed successfully".into(),
        },
        start_time: start,
        end_time: status
            .is_terminal()
            .then(|| start + chrono::Duration::seconds(5)),
        from_table: "SELECT id FROM orders".into(),
        to_table: "orders".into(),
    }
}

/// Single integer column `id` with `rows` rows.
fn ids(rows: usize) -> Dataset {
    let mut data = Dataset::new(vec![Column::new("id", ColumnType::Integer)]);
    data.rows = (0..rows as i64).map(|i| vec![SqlValue::Int(i)]).collect();
    data
}

// =============================================================================
// Audit Upsert Tests
// =============================================================================

#[tokio::test]
async fn test_portable_upsert_inserts_then_updates() {
    // First lookup finds nothing, the second finds the STARTED row
    let conn = Arc::new(RecordingConnection::new(DbKind::Postgres).with_counts(&[0, 1]));
    let logger = AuditLogger::new(conn.clone(), "etl_process_log", None);

    let started = entry(RunStatus::Started);
    let completed = entry(RunStatus::Completed);
    logger.try_log(&started).await.unwrap();
    logger.try_log(&completed).await.unwrap();

    let calls = conn.calls();
    assert_eq!(conn.keywords(), vec!["SELECT", "INSERT", "SELECT", "UPDATE"]);

    assert!(calls[0].query);
    assert!(calls[0].sql.starts_with("SELECT COUNT(*) FROM \"etl_process_log\""));
    assert_eq!(calls[0].params, started.key_params());

    assert!(!calls[1].query);
    assert_eq!(calls[1].params, started.row_params());
    assert_eq!(calls[1].params[1], SqlValue::Text("STARTED".into()));
    assert!(calls[1].params[4].is_null());

    assert_eq!(calls[2].params, completed.key_params());

    assert!(calls[3].sql.starts_with("UPDATE \"etl_process_log\" SET status ="));
    assert_eq!(calls[3].params, completed.update_params());
    assert_eq!(calls[3].params[0], SqlValue::Text("COMPLETED".into()));
    assert_eq!(calls[3].params[2], SqlValue::DateTime(completed.end_time.unwrap()));
    assert_eq!(&calls[3].params[3..], started.key_params().as_slice());
}

#[tokio::test]
async fn test_mysql_uses_portable_upsert_with_question_marks() {
    let conn = RecordingConnection::new(DbKind::Mariadb).with_counts(&[1]);
    conn.upsert_audit(Some("etl"), "etl_process_log", &entry(RunStatus::Failed))
        .await
        .unwrap();

    let calls = conn.calls();
    assert_eq!(conn.keywords(), vec!["SELECT", "UPDATE"]);
    assert!(calls[1].sql.starts_with("UPDATE `etl`.`etl_process_log`"));
    assert_eq!(calls[1].sql.matches('?').count(), calls[1].params.len());
}

#[tokio::test]
async fn test_merge_upsert_is_one_statement() {
    for kind in [DbKind::Mssql, DbKind::Oracle] {
        let conn = RecordingConnection::new(kind);
        let started = entry(RunStatus::Started);
        let completed = entry(RunStatus::Completed);
        conn.upsert_audit(None, "etl_process_log", &started).await.unwrap();
        conn.upsert_audit(None, "etl_process_log", &completed).await.unwrap();

        let calls = conn.calls();
        assert_eq!(calls.len(), 2, "{:?}", kind);
        assert!(calls.iter().all(|c| !c.query && c.keyword() == "MERGE"));
        assert_eq!(calls[0].params, started.row_params());
        assert_eq!(calls[1].params, completed.row_params());
        assert_eq!(calls[0].sql, calls[1].sql);
    }
}

// =============================================================================
// Insert Chunking Tests
// =============================================================================

#[tokio::test]
async fn test_full_chunk_is_one_insert() {
    let conn = RecordingConnection::new(DbKind::Postgres);
    let written = conn.load_rows(None, "t", &ids(500), false).await.unwrap();

    assert_eq!(written, 500);
    assert_eq!(conn.keywords(), vec!["BEGIN", "INSERT", "COMMIT"]);
    assert_eq!(conn.calls()[1].params.len(), 500);
}

#[tokio::test]
async fn test_one_row_past_chunk_is_two_inserts() {
    let conn = RecordingConnection::new(DbKind::Postgres);
    let written = conn.load_rows(None, "t", &ids(501), false).await.unwrap();

    assert_eq!(written, 501);
    assert_eq!(conn.keywords(), vec!["BEGIN", "INSERT", "INSERT", "COMMIT"]);
    let calls = conn.calls();
    assert_eq!(calls[1].params.len(), 500);
    assert_eq!(calls[2].params, vec![SqlValue::Int(500)]);
    assert!(!calls[2].sql.contains("$2"));
}

#[tokio::test]
async fn test_wide_rows_chunk_to_bind_limit() {
    // SQL Server allows 2000 parameters: 10 columns gives 200 rows per INSERT
    let columns: Vec<Column> = (0..10)
        .map(|i| Column::new(format!("c{}", i), ColumnType::Integer))
        .collect();
    let mut data = Dataset::new(columns);
    data.rows = (0..450).map(|r| (0..10).map(|c| SqlValue::Int(r * 10 + c)).collect()).collect();

    let conn = RecordingConnection::new(DbKind::Mssql);
    conn.load_rows(Some("dbo"), "wide", &data, false).await.unwrap();

    let inserts: Vec<Call> = conn.calls().into_iter().filter(|c| c.keyword() == "INSERT").collect();
    let sizes: Vec<usize> = inserts.iter().map(|c| c.params.len()).collect();
    assert_eq!(sizes, vec![2000, 2000, 500]);
    assert_eq!(conn.calls()[0].sql, "BEGIN TRANSACTION");
}

#[tokio::test]
async fn test_empty_dataset_sends_nothing() {
    let conn = RecordingConnection::new(DbKind::Postgres);
    assert_eq!(conn.load_rows(None, "t", &ids(0), false).await.unwrap(), 0);
    assert!(conn.calls().is_empty());
}

// =============================================================================
// Transactional Load Tests
// =============================================================================

#[tokio::test]
async fn test_truncate_load_commits_delete_and_inserts_together() {
    // Table exists
    let conn = RecordingConnection::new(DbKind::Postgres).with_counts(&[1]);
    let written = load(&conn, &ids(600), Some("public"), "t", LoadMode::Truncate)
        .await
        .unwrap();

    assert_eq!(written, 600);
    assert_eq!(
        conn.keywords(),
        vec!["SELECT", "BEGIN", "TRUNCATE", "INSERT", "INSERT", "COMMIT"]
    );
}

#[tokio::test]
async fn test_failed_chunk_rolls_back_truncate() {
    let conn = RecordingConnection::new(DbKind::Postgres)
        .with_counts(&[1])
        .failing_insert(2);
    let err = load(&conn, &ids(600), Some("public"), "t", LoadMode::Truncate)
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Load { .. }));
    assert!(err.to_string().contains("duplicate key value"));
    assert_eq!(
        conn.keywords(),
        vec!["SELECT", "BEGIN", "TRUNCATE", "INSERT", "INSERT", "ROLLBACK"]
    );
}

#[tokio::test]
async fn test_mysql_truncate_load_deletes_inside_transaction() {
    let conn = RecordingConnection::new(DbKind::Mysql)
        .with_counts(&[1])
        .failing_insert(1);
    load(&conn, &ids(3), None, "t", LoadMode::Truncate)
        .await
        .unwrap_err();

    let keywords = conn.keywords();
    assert_eq!(keywords, vec!["SELECT", "BEGIN", "DELETE", "INSERT", "ROLLBACK"]);
}

#[tokio::test]
async fn test_new_table_is_created_outside_the_transaction() {
    let conn = RecordingConnection::new(DbKind::Postgres).with_counts(&[0]);
    load(&conn, &ids(2), None, "fresh", LoadMode::Truncate)
        .await
        .unwrap();

    // A table created by this load has nothing to replace
    assert_eq!(
        conn.keywords(),
        vec!["SELECT", "CREATE", "BEGIN", "INSERT", "COMMIT"]
    );
}
