//! Run orchestrator - sequences the ETL stages for one configured run.
//!
//! ```text
//! STARTED -> EXTRACTING -> SCHEMA_CHECK -> TYPE_CHECK -> TRANSFORMING -> LOADING -> COMPLETED
//!    \___________\______________\_____________\_____________\_____________\____> FAILED
//! ```
//!
//! STARTED is written to the audit log before any data connection is made.
//! The first failing stage short-circuits to a single FAILED write. Errors
//! and panics are caught here; [`Orchestrator::run`] always returns a
//! [`RunResult`].

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDateTime};
use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audit::AuditLogger;
use crate::config::{Config, DbEndpoint, SourceConfig};
use crate::core::{AuditEntry, ColumnTypeMap, Connection, DbKind, RunStatus};
use crate::drivers::{ConnectionProvider, DriverConnectionProvider};
use crate::error::{EtlError, Result};
use crate::extract::{self, detect_file_type};
use crate::load;
use crate::schema::get_destination_schema;
use crate::transform::transform;
use crate::typecheck::{find_type_mismatches, TypeMismatch};

/// Process name used when the source query names no table.
pub const GENERIC_PROCESS_NAME: &str = "ETL_PROCESS";

pub const DETAILS_STARTED: &str = "ETL process initiated";
pub const DETAILS_CONNECTION_ERROR: &str = "Connection error";
pub const DETAILS_EXTRACTION_FAILED: &str = "Source data extraction failed or is empty";
pub const DETAILS_TYPE_MISMATCH: &str = "Data type mismatch";

static FROM_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)from\s+(\w+)").expect("valid regex"));

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    Started,
    Extracting,
    SchemaCheck,
    TypeCheck,
    Transforming,
    Loading,
    Completed,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Started => "STARTED",
            RunStage::Extracting => "EXTRACTING",
            RunStage::SchemaCheck => "SCHEMA_CHECK",
            RunStage::TypeCheck => "TYPE_CHECK",
            RunStage::Transforming => "TRANSFORMING",
            RunStage::Loading => "LOADING",
            RunStage::Completed => "COMPLETED",
            RunStage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and timing of one run.
///
/// The audit key is `(process_name, from_identifier, to_identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDescriptor {
    pub process_name: String,
    pub from_identifier: String,
    pub to_identifier: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
}

impl RunDescriptor {
    pub fn new(
        process_name: impl Into<String>,
        from_identifier: impl Into<String>,
        to_identifier: impl Into<String>,
        start_time: NaiveDateTime,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            from_identifier: from_identifier.into(),
            to_identifier: to_identifier.into(),
            start_time,
            end_time: None,
        }
    }

    /// Descriptor for a configured run, starting now.
    pub fn for_config(config: &Config) -> Self {
        Self::new(
            derive_process_name(config),
            config.source.identifier(),
            config.destination.table.clone(),
            now(),
        )
    }

    /// Audit entry for this run.
    pub fn entry(&self, status: RunStatus, details: impl Into<String>) -> AuditEntry {
        AuditEntry {
            process_name: self.process_name.clone(),
            status,
            details: details.into(),
            start_time: self.start_time,
            end_time: self.end_time,
            from_table: self.from_identifier.clone(),
            to_table: self.to_identifier.clone(),
        }
    }
}

/// Process name for a query source: `ETL_{from}_{first table after FROM}_to_{to}_{table}`.
pub fn query_process_name(from: DbKind, to: DbKind, sql: &str, table: &str) -> String {
    match FROM_TABLE_RE.captures(sql).and_then(|c| c.get(1)) {
        Some(source_table) => format!(
            "ETL_{}_{}_to_{}_{}",
            from.display_name(),
            source_table.as_str(),
            to.display_name(),
            table
        ),
        None => GENERIC_PROCESS_NAME.to_string(),
    }
}

/// Process name for a file source: `ETL_{Excel|Csv}_{table}_to_{to}`.
pub fn file_process_name(path: &Path, to: DbKind, table: &str) -> String {
    match detect_file_type(path) {
        Some(file_type) => format!("ETL_{}_{}_to_{}", file_type.label(), table, to.display_name()),
        None => GENERIC_PROCESS_NAME.to_string(),
    }
}

/// Process name for a configured run.
pub fn derive_process_name(config: &Config) -> String {
    let to = config.destination.connection.kind;
    let table = &config.destination.table;
    match &config.source {
        SourceConfig::Query { connection, sql } => {
            query_process_name(connection.kind, to, sql, table)
        }
        SourceConfig::File { path, .. } => file_process_name(path, to, table),
    }
}

/// Audit details for a failed run.
pub fn failure_details(err: &EtlError) -> String {
    match err {
        EtlError::Connection { .. } | EtlError::Pool { .. } => DETAILS_CONNECTION_ERROR.to_string(),
        EtlError::Extraction(_) => DETAILS_EXTRACTION_FAILED.to_string(),
        EtlError::TypeMismatch { .. } => DETAILS_TYPE_MISMATCH.to_string(),
        other => format!("ETL process failed: {}", other),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    pub process_name: String,

    /// COMPLETED or FAILED.
    pub status: RunStatus,

    /// Last stage entered. For failed runs, the stage that failed.
    pub final_stage: RunStage,

    /// Audit details written with the terminal entry.
    pub details: String,

    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_seconds: f64,

    pub rows_extracted: usize,
    pub rows_loaded: u64,

    /// Columns rejected by the type check.
    pub mismatches: Vec<TypeMismatch>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Serialize result to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-run state threaded through the stages.
pub struct RunContext {
    pub descriptor: RunDescriptor,
    pub audit: AuditLogger,
    stage: RunStage,
    source: Option<Arc<dyn Connection>>,
    destination: Option<Arc<dyn Connection>>,
    rows_extracted: usize,
    rows_loaded: u64,
    mismatches: Vec<TypeMismatch>,
}

impl RunContext {
    pub fn new(descriptor: RunDescriptor, audit: AuditLogger) -> Self {
        Self {
            descriptor,
            audit,
            stage: RunStage::Started,
            source: None,
            destination: None,
            rows_extracted: 0,
            rows_loaded: 0,
            mismatches: Vec::new(),
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    fn enter(&mut self, stage: RunStage) {
        info!("{}: {}", self.descriptor.process_name, stage);
        self.stage = stage;
    }

    async fn close_connections(&mut self) {
        if let Some(conn) = self.source.take() {
            conn.close().await;
        }
        if let Some(conn) = self.destination.take() {
            conn.close().await;
        }
    }
}

/// Health of one configured endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub label: String,
    pub kind: DbKind,
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    pub error: Option<String>,
}

/// Runs one configured ETL job.
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn ConnectionProvider>,
}

impl Orchestrator {
    /// Create an orchestrator using the real database drivers.
    pub fn new(config: Config) -> Self {
        Self::with_provider(config, Arc::new(DriverConnectionProvider::new()))
    }

    /// Create an orchestrator with a custom connection provider.
    pub fn with_provider(config: Config, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn connect(&self, endpoint: &DbEndpoint) -> Result<Arc<dyn Connection>> {
        self.provider.connect(endpoint).await
    }

    /// Audit logger for this run. An unreachable audit database yields a
    /// disabled logger rather than an error.
    async fn audit_logger(&self) -> AuditLogger {
        let audit = &self.config.audit;
        match self.connect(&audit.connection).await {
            Ok(conn) => AuditLogger::new(conn, audit.table.clone(), audit.schema.clone()),
            Err(e) => {
                error!("Audit database unavailable: {}", e);
                AuditLogger::disabled(audit.table.clone())
            }
        }
    }

    /// Run the job. Never returns an error: failures are recorded in the
    /// audit log and in the returned [`RunResult`].
    pub async fn run(&self) -> RunResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let descriptor = RunDescriptor::for_config(&self.config);
        info!(
            "Starting ETL run {} ({})",
            run_id, descriptor.process_name
        );

        let audit = self.audit_logger().await;
        let mut ctx = RunContext::new(descriptor, audit);
        ctx.audit
            .log(&ctx.descriptor.entry(RunStatus::Started, DETAILS_STARTED))
            .await;

        let outcome = AssertUnwindSafe(self.execute(&mut ctx)).catch_unwind().await;

        let (status, details) = match outcome {
            Ok(Ok(())) => {
                let elapsed = (now() - ctx.descriptor.start_time).num_milliseconds() as f64 / 1000.0;
                ctx.enter(RunStage::Completed);
                (
                    RunStatus::Completed,
                    format!("ETL process completed successfully in {:.2}s", elapsed),
                )
            }
            Ok(Err(e)) => {
                error!("ETL process failed at {}: {}", ctx.stage, e);
                (RunStatus::Failed, failure_details(&e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("ETL process failed at {}: {}", ctx.stage, message);
                (RunStatus::Failed, format!("ETL process failed: {}", message))
            }
        };

        ctx.close_connections().await;

        let end_time = now();
        ctx.descriptor.end_time = Some(end_time);
        ctx.audit
            .log(&ctx.descriptor.entry(status, details.clone()))
            .await;
        if let Some(conn) = ctx.audit.connection() {
            conn.close().await;
        }

        let duration = end_time - ctx.descriptor.start_time;
        RunResult {
            run_id,
            process_name: ctx.descriptor.process_name.clone(),
            status,
            final_stage: ctx.stage,
            details,
            start_time: ctx.descriptor.start_time,
            end_time,
            duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
            rows_extracted: ctx.rows_extracted,
            rows_loaded: ctx.rows_loaded,
            mismatches: std::mem::take(&mut ctx.mismatches),
        }
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<()> {
        let config = &self.config;
        let destination_cfg = &config.destination;
        let schema = destination_cfg.schema.as_deref();

        // Connect
        let destination = self
            .connect(&destination_cfg.connection)
            .await?;
        ctx.destination = Some(Arc::clone(&destination));
        if let SourceConfig::Query { connection, .. } = &config.source {
            ctx.source = Some(self.connect(connection).await?);
        }
        info!(
            "Connected to {} and {}",
            match &config.source {
                SourceConfig::Query { connection, .. } => connection.kind.display_name(),
                SourceConfig::File { .. } => "file",
            },
            destination.kind().display_name()
        );

        // Extract
        ctx.enter(RunStage::Extracting);
        let extracted = match (&config.source, &ctx.source) {
            (SourceConfig::Query { sql, .. }, Some(source)) => {
                extract::extract_query(source.as_ref(), sql).await
            }
            (SourceConfig::File { path, sheet }, _) => extract::extract_file(path, sheet.as_deref()),
            (SourceConfig::Query { .. }, None) => Err(EtlError::Extraction(
                "source connection missing".to_string(),
            )),
        };
        let data = match extracted {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => return Err(EtlError::Extraction("source returned no rows".into())),
            Err(e) => return Err(e),
        };
        ctx.rows_extracted = data.row_count();

        // Schema check
        ctx.enter(RunStage::SchemaCheck);
        let destination_types: ColumnTypeMap =
            get_destination_schema(destination.as_ref(), &destination_cfg.table, schema).await;
        let destination_columns = if !destination_types.is_empty() {
            destination_types.column_names()
        } else if config.load_mode().creates_table()
            && !destination
                .table_exists(schema, &destination_cfg.table)
                .await
                .unwrap_or(true)
        {
            info!(
                "Destination table '{}' does not exist; it will be created from the source columns",
                destination_cfg.table
            );
            data.column_names()
        } else {
            return Err(EtlError::Schema(format!(
                "No column metadata for destination table '{}'",
                destination_cfg.table
            )));
        };

        // Type check
        ctx.enter(RunStage::TypeCheck);
        let mismatches = find_type_mismatches(&data, &destination_types);
        if !mismatches.is_empty() {
            let columns = mismatches.iter().map(|m| m.column.clone()).collect();
            ctx.mismatches = mismatches;
            return Err(EtlError::TypeMismatch { columns });
        }

        // Transform
        ctx.enter(RunStage::Transforming);
        let source_columns = data.column_names();
        let transformed = transform(
            data,
            &source_columns,
            &destination_columns,
            config.transform.null_policy,
        )?;

        // Load
        ctx.enter(RunStage::Loading);
        ctx.rows_loaded = load::load(
            destination.as_ref(),
            &transformed,
            schema,
            &destination_cfg.table,
            config.load_mode(),
        )
        .await?;

        Ok(())
    }

    /// Connect to and ping every configured endpoint.
    pub async fn health_check(&self) -> Vec<EndpointHealth> {
        let mut results = Vec::new();
        for (label, endpoint) in self.config.endpoints() {
            let outcome = match self.connect(endpoint).await {
                Ok(conn) => {
                    let ping = conn.ping().await;
                    conn.close().await;
                    ping
                }
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(()) => info!("{} ({}) is healthy", label, endpoint.kind),
                Err(e) => error!("{} ({}) is unhealthy: {}", label, endpoint.kind, e),
            }
            results.push(EndpointHealth {
                label: label.to_string(),
                kind: endpoint.kind,
                host: endpoint.host.clone(),
                port: endpoint.port(),
                healthy: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        results
    }

    /// Read the destination table's column types.
    pub async fn destination_schema(&self) -> Result<ColumnTypeMap> {
        let destination = &self.config.destination;
        let conn = self.connect(&destination.connection).await?;
        let map = get_destination_schema(
            conn.as_ref(),
            &destination.table,
            destination.schema.as_deref(),
        )
        .await;
        conn.close().await;
        Ok(map)
    }

    /// Create the audit log table if absent. Returns true if created.
    pub async fn init_audit(&self) -> Result<bool> {
        let audit = &self.config.audit;
        let conn = self.connect(&audit.connection).await?;
        let logger = AuditLogger::new(Arc::clone(&conn), audit.table.clone(), audit.schema.clone());
        let created = logger.init_table().await;
        conn.close().await;
        created
    }
}
