//! Audit logging of run lifecycle events.
//!
//! Every run writes one row to the audit table, keyed by
//! `(process_name, from_table, to_table)`: STARTED inserts it, the terminal
//! event updates status, details and end_time in place.
//!
//! The logger is owned by the run context and passed to every write. Failures
//! are logged and swallowed so that the audit trail never changes the outcome
//! of a data movement.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::core::{AuditEntry, Connection, RunStatus};
use crate::error::{EtlError, Result};

/// Default audit log table name.
pub const DEFAULT_AUDIT_TABLE: &str = "etl_process_log";

/// Writes audit entries through a connection.
///
/// A logger without a connection (the audit database was unreachable) skips
/// every write with a warning.
#[derive(Clone)]
pub struct AuditLogger {
    conn: Option<Arc<dyn Connection>>,
    table: String,
    schema: Option<String>,
}

impl AuditLogger {
    /// Logger writing to `schema.table` through `conn`.
    pub fn new(conn: Arc<dyn Connection>, table: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            conn: Some(conn),
            table: table.into(),
            schema,
        }
    }

    /// Logger that drops every entry.
    pub fn disabled(table: impl Into<String>) -> Self {
        Self {
            conn: None,
            table: table.into(),
            schema: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.conn.as_ref()
    }

    /// Upsert one entry, returning any failure as [`EtlError::Audit`].
    pub async fn try_log(&self, entry: &AuditEntry) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Err(EtlError::Audit("no audit connection".into()));
        };
        conn.upsert_audit(self.schema.as_deref(), &self.table, entry)
            .await
            .map_err(|e| EtlError::Audit(e.to_string()))
    }

    /// Upsert one entry. Never fails.
    pub async fn log(&self, entry: &AuditEntry) {
        if !self.is_enabled() {
            warn!(
                "Audit log unavailable; not recording {} for {}",
                entry.status, entry.process_name
            );
            return;
        }
        match self.try_log(entry).await {
            Ok(()) => info!(
                "ETL process logged successfully: {}, Status: {}",
                entry.process_name, entry.status
            ),
            Err(e) => error!("Failed to log ETL process: {}", e),
        }
    }

    /// Record a lifecycle event. Never fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_event(
        &self,
        process_name: &str,
        status: RunStatus,
        details: &str,
        start_time: NaiveDateTime,
        end_time: Option<NaiveDateTime>,
        from_table: &str,
        to_table: &str,
    ) {
        let entry = AuditEntry {
            process_name: process_name.to_string(),
            status,
            details: details.to_string(),
            start_time,
            end_time,
            from_table: from_table.to_string(),
            to_table: to_table.to_string(),
        };
        self.log(&entry).await;
    }

    /// Create the audit table if it does not exist. Returns true if created.
    pub async fn init_table(&self) -> Result<bool> {
        let Some(conn) = &self.conn else {
            return Err(EtlError::Audit("no audit connection".into()));
        };
        let created = conn
            .create_audit_table(self.schema.as_deref(), &self.table)
            .await
            .map_err(|e| EtlError::Audit(e.to_string()))?;
        if created {
            info!("Created audit table '{}'", self.table);
        } else {
            info!("Audit table '{}' already exists", self.table);
        }
        Ok(created)
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.is_enabled())
            .field("table", &self.table)
            .field("schema", &self.schema)
            .finish()
    }
}
