//! # etlpipe
//!
//! Audited ETL runs from SQL queries or flat files into relational tables.
//!
//! A run extracts a dataset from a source query (Oracle, PostgreSQL, MySQL,
//! MariaDB or MSSQL) or a CSV/spreadsheet file, checks its column types
//! against the destination table's catalog, projects it onto the destination
//! columns and loads it. Each run is recorded in an audit table with
//! upsert semantics:
//!
//! - **STARTED** written before any data connection
//! - **COMPLETED** or **FAILED** written once, updating the same row
//!
//! ## Example
//!
//! ```rust,no_run
//! use etlpipe::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> etlpipe::Result<()> {
//!     let config = Config::load("etl.yaml")?;
//!     let result = Orchestrator::new(config).run().await;
//!     println!("{}: {} rows loaded", result.status, result.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod schema;
pub mod transform;
pub mod typecheck;

// Re-exports for convenient access
pub use audit::AuditLogger;
pub use config::{
    AuditConfig, Config, DbEndpoint, DestinationConfig, LoadMode, NullPolicy, SourceConfig,
    TransformConfig,
};
pub use core::{
    AuditEntry, Column, ColumnType, ColumnTypeMap, Connection, Dataset, DbKind, Dialect,
    RunStatus, SqlValue,
};
pub use drivers::{ConnectionProvider, DialectImpl, DriverConnectionProvider, SslMode};
pub use error::{EtlError, Result};
pub use orchestrator::{EndpointHealth, Orchestrator, RunDescriptor, RunResult, RunStage};
pub use schema::get_destination_schema;
pub use typecheck::{check_type_mismatch, find_type_mismatches, TypeMismatch};
