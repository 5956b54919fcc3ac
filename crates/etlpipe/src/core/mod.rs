//! Core abstractions for engine-agnostic ETL.
//!
//! This module provides the foundational types and traits used throughout
//! the engine:
//!
//! - [`value`]: cell values and column types
//! - [`dataset`]: the in-memory table moved between stages
//! - [`schema`]: destination column metadata
//! - [`record`]: audit log rows
//! - [`kind`]: supported database engines
//! - [`traits`]: the `Dialect` and `Connection` traits
//!
//! Driver modules (`drivers/postgres`, `drivers/oracle`, ...) implement the
//! traits; the pipeline stages only see `dyn Connection`.

pub mod dataset;
pub mod kind;
pub mod record;
pub mod schema;
pub mod traits;
pub mod value;

pub use dataset::{normalize_column_name, Column, Dataset};
pub use kind::DbKind;
pub use record::{AuditEntry, RunStatus};
pub use schema::ColumnTypeMap;
pub use traits::{AuditUpsertSql, Connection, Dialect, Statement, INSERT_CHUNK_ROWS};
pub use value::{ColumnType, SqlValue};
