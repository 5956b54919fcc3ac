//! In-memory database used by the integration tests.
//!
//! `MemoryConnection` overrides the catalog, DDL, load and audit methods
//! of `Connection`, so no SQL is interpreted. Source queries return datasets
//! registered with [`MemoryDatabase::with_query`]. The SQL those default
//! methods generate is covered by `sql_paths_tests.rs`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use etlpipe::config::{
    AuditConfig, Config, DbEndpoint, DestinationConfig, SourceConfig, TransformConfig,
};
use etlpipe::core::{AuditEntry, Column, Connection, Dataset, DbKind, Dialect, SqlValue};
use etlpipe::drivers::{ConnectionProvider, DialectImpl};
use etlpipe::{EtlError, Result};

/// One stored table.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Shared state of one in-memory database.
#[derive(Debug, Default)]
pub struct MemoryState {
    pub tables: HashMap<String, MemoryTable>,
    pub queries: HashMap<String, Dataset>,
    pub audit_rows: Vec<AuditEntry>,
    pub audit_writes: usize,
    pub truncates: usize,
    pub fail_catalog: bool,
    pub fail_insert: bool,
    pub fail_audit: bool,
    pub panic_on_insert: bool,
}

/// Handle to an in-memory database; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    kind: DbKind,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new(kind: DbKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub fn with_table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_lowercase(),
            MemoryTable {
                columns: columns
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn with_query(self, sql: &str, data: Dataset) -> Self {
        self.state
            .lock()
            .unwrap()
            .queries
            .insert(sql.to_string(), data);
        self
    }

    pub fn update(&self, f: impl FnOnce(&mut MemoryState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&name.to_lowercase())
            .cloned()
    }

    pub fn audit_rows(&self) -> Vec<AuditEntry> {
        self.state.lock().unwrap().audit_rows.clone()
    }

    pub fn audit_writes(&self) -> usize {
        self.state.lock().unwrap().audit_writes
    }

    pub fn truncates(&self) -> usize {
        self.state.lock().unwrap().truncates
    }

    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::new(MemoryConnection {
            kind: self.kind,
            dialect: DialectImpl::for_kind(self.kind),
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MemoryConnection {
    kind: DbKind,
    dialect: DialectImpl,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn kind(&self) -> DbKind {
        self.kind
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, _params: &[SqlValue]) -> Result<Dataset> {
        let state = self.state.lock().unwrap();
        state
            .queries
            .get(sql)
            .cloned()
            .ok_or_else(|| EtlError::Extraction(format!("no such query: {}", sql)))
    }

    async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
        Ok(0)
    }

    async fn table_columns(&self, _schema: &str, table: &str) -> Result<Vec<(String, String)>> {
        let state = self.state.lock().unwrap();
        if state.fail_catalog {
            return Err(EtlError::Schema("catalog unavailable".into()));
        }
        Ok(state
            .tables
            .get(&table.to_lowercase())
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn table_exists(&self, _schema: Option<&str>, table: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .contains_key(&table.to_lowercase()))
    }

    async fn create_table(&self, _schema: Option<&str>, table: &str, columns: &[Column]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = table.to_lowercase();
        if state.tables.contains_key(&key) {
            return Err(EtlError::Schema(format!("relation \"{}\" already exists", table)));
        }
        let columns = columns
            .iter()
            .map(|c| (c.name.clone(), self.dialect.column_type_ddl(c.column_type).to_string()))
            .collect();
        state.tables.insert(
            key,
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_rows(
        &self,
        _schema: Option<&str>,
        table: &str,
        data: &Dataset,
        replace: bool,
    ) -> Result<u64> {
        let panic_on_insert = self.state.lock().unwrap().panic_on_insert;
        if panic_on_insert {
            panic!("insert exploded");
        }

        let mut state = self.state.lock().unwrap();
        if replace {
            state.truncates += 1;
        }
        if state.fail_insert {
            return Err(EtlError::load(table, "disk full"));
        }
        let Some(target) = state.tables.get_mut(&table.to_lowercase()) else {
            return Err(EtlError::load(table, "table does not exist"));
        };
        if replace {
            target.rows.clear();
        }
        target.rows.extend(data.rows.iter().cloned());
        Ok(data.row_count() as u64)
    }

    async fn upsert_audit(&self, _schema: Option<&str>, _table: &str, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.audit_writes += 1;
        if state.fail_audit {
            return Err(EtlError::Audit("audit table locked".into()));
        }
        let existing = state.audit_rows.iter_mut().find(|row| {
            row.process_name == entry.process_name
                && row.from_table == entry.from_table
                && row.to_table == entry.to_table
        });
        match existing {
            Some(row) => {
                row.status = entry.status;
                row.details = entry.details.clone();
                row.end_time = entry.end_time;
            }
            None => state.audit_rows.push(entry.clone()),
        }
        Ok(())
    }

    async fn create_audit_table(&self, _schema: Option<&str>, table: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let key = table.to_lowercase();
        if state.tables.contains_key(&key) {
            return Ok(false);
        }
        state.tables.insert(key, MemoryTable::default());
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Provider handing out in-memory databases by endpoint host.
#[derive(Default)]
pub struct MemoryProvider {
    databases: HashMap<String, MemoryDatabase>,
    unreachable: HashSet<String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, host: &str, db: &MemoryDatabase) -> Self {
        self.databases.insert(host.to_string(), db.clone());
        self
    }

    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }
}

#[async_trait]
impl ConnectionProvider for MemoryProvider {
    async fn connect(&self, endpoint: &DbEndpoint) -> Result<Arc<dyn Connection>> {
        if self.unreachable.contains(&endpoint.host) {
            return Err(EtlError::connection(endpoint.kind, "connection refused"));
        }
        self.databases
            .get(&endpoint.host)
            .map(MemoryDatabase::connection)
            .ok_or_else(|| EtlError::connection(endpoint.kind, "unknown host"))
    }
}

pub const AUDIT_HOST: &str = "audit-db";
pub const SOURCE_HOST: &str = "source-db";
pub const DEST_HOST: &str = "dest-db";

pub const ORDERS_QUERY: &str = "SELECT id, name, created_at FROM orders";

/// Config for a query run from an Oracle source into PostgreSQL `public.orders`.
pub fn query_config(sql: &str) -> Config {
    Config {
        audit: AuditConfig {
            connection: DbEndpoint::new(DbKind::Oracle, AUDIT_HOST, "XEPDB1", "hr", "pw"),
            table: "etl_process_log".to_string(),
            schema: None,
        },
        source: SourceConfig::Query {
            connection: DbEndpoint::new(DbKind::Oracle, SOURCE_HOST, "XEPDB1", "hr", "pw"),
            sql: sql.to_string(),
        },
        destination: DestinationConfig {
            connection: DbEndpoint::new(DbKind::Postgres, DEST_HOST, "dw", "loader", "pw"),
            table: "orders".to_string(),
            schema: Some("public".to_string()),
            load_mode: None,
        },
        transform: TransformConfig::default(),
    }
}

/// Config for a file run into PostgreSQL `public.<table>`.
pub fn file_config(path: &std::path::Path, table: &str) -> Config {
    let mut config = query_config("");
    config.source = SourceConfig::File {
        path: path.to_path_buf(),
        sheet: None,
    };
    config.destination.table = table.to_string();
    config
}

/// Three order rows (one duplicate) typed integer, text, datetime.
pub fn orders_dataset() -> Dataset {
    let ts = |s: &str| {
        SqlValue::DateTime(chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap())
    };
    Dataset::from_rows(
        vec!["ID".into(), "NAME".into(), "CREATED_AT".into()],
        vec![
            vec![SqlValue::Int(1), "alpha".into(), ts("2024-01-01 10:00:00")],
            vec![SqlValue::Int(2), "beta".into(), ts("2024-01-02 11:00:00")],
            vec![SqlValue::Int(2), "beta".into(), ts("2024-01-02 11:00:00")],
        ],
    )
}

/// Destination `orders` table with compatible PostgreSQL types.
pub fn orders_destination() -> MemoryDatabase {
    MemoryDatabase::new(DbKind::Postgres).with_table(
        "orders",
        &[
            ("id", "bigint"),
            ("name", "character varying"),
            ("created_at", "timestamp without time zone"),
        ],
    )
}
