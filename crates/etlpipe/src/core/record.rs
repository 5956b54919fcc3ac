//! Audit log records.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Lifecycle status written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "STARTED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit log table.
///
/// The row key is `(process_name, from_table, to_table)`; a later write for
/// the same key overwrites `status`, `details` and `end_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub process_name: String,
    pub status: RunStatus,
    pub details: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub from_table: String,
    pub to_table: String,
}

impl AuditEntry {
    /// Key parameters: process_name, from_table, to_table.
    pub fn key_params(&self) -> Vec<SqlValue> {
        vec![
            self.process_name.as_str().into(),
            self.from_table.as_str().into(),
            self.to_table.as_str().into(),
        ]
    }

    /// Full row parameters in column order:
    /// process_name, status, details, start_time, end_time, from_table, to_table.
    pub fn row_params(&self) -> Vec<SqlValue> {
        vec![
            self.process_name.as_str().into(),
            self.status.as_str().into(),
            self.details.as_str().into(),
            self.start_time.into(),
            self.end_time.into(),
            self.from_table.as_str().into(),
            self.to_table.as_str().into(),
        ]
    }

    /// Update parameters: status, details, end_time, then the key.
    pub fn update_params(&self) -> Vec<SqlValue> {
        let mut params = vec![
            self.status.as_str().into(),
            self.details.as_str().into(),
            self.end_time.into(),
        ];
        params.extend(self.key_params());
        params
    }
}
