//! Error types for the ETL engine.

use thiserror::Error;

/// Main error type for ETL operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database handle could not be acquired.
    #[error("Connection to {kind} failed: {message}")]
    Connection { kind: String, message: String },

    /// Source query or file read failed, or produced nothing.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Destination metadata unavailable.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Category reconciliation failed for one or more columns.
    #[error("Data type mismatch in columns: {}", .columns.join(", "))]
    TypeMismatch { columns: Vec<String> },

    /// Projection, deduplication or null handling failed.
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Write to the destination table failed.
    #[error("Load into {table} failed: {message}")]
    Load { table: String, message: String },

    /// Audit log write failed.
    #[error("Audit log error: {0}")]
    Audit(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MSSQL driver error
    #[error("MSSQL error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// MySQL/MariaDB driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// ODBC driver error (Oracle)
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet parsing error
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        EtlError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error for a database kind.
    pub fn connection(kind: impl ToString, message: impl ToString) -> Self {
        EtlError::Connection {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Load error
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        EtlError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config(_) | EtlError::Yaml(_) => 2,
            EtlError::Connection { .. } | EtlError::Pool { .. } => 3,
            _ => 1,
        }
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;
