//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::DbKind;
use crate::drivers::common::SslMode;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where run lifecycle events are recorded.
    pub audit: AuditConfig,

    /// Where the data comes from.
    pub source: SourceConfig,

    /// Where the data goes.
    pub destination: DestinationConfig,

    /// Transform behavior.
    #[serde(default)]
    pub transform: TransformConfig,
}

impl Config {
    /// Effective load mode: explicit setting, else `create_append` for file
    /// sources and `append` for query sources.
    pub fn load_mode(&self) -> LoadMode {
        self.destination.load_mode.unwrap_or(match self.source {
            SourceConfig::File { .. } => LoadMode::CreateAppend,
            SourceConfig::Query { .. } => LoadMode::Append,
        })
    }
}

/// Connection details for one database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbEndpoint {
    /// Database engine.
    #[serde(alias = "type")]
    pub kind: DbKind,

    /// Database host.
    pub host: String,

    /// Database port (default depends on `kind`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name, or service name for Oracle.
    #[serde(alias = "service_name")]
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Environment variable holding the password, read at load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// ODBC driver name (Oracle only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// TLS mode (PostgreSQL only, default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Encrypt and trust the server certificate (MSSQL only, default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl DbEndpoint {
    /// Create an endpoint with the default port for `kind`.
    pub fn new(
        kind: DbKind,
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            host: host.into(),
            port: None,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            password_env: None,
            driver: None,
            ssl_mode: SslMode::default(),
            trust_server_cert: false,
        }
    }

    /// Configured port, or the engine default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }
}

impl fmt::Debug for DbEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbEndpoint")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("password_env", &self.password_env)
            .field("driver", &self.driver)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Audit log location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub connection: DbEndpoint,

    /// Log table name (default: "etl_process_log").
    #[serde(default = "default_audit_table")]
    pub table: String,

    /// Log table schema (default: the connection's current schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Data source: a query against a database, or a flat file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    Query {
        connection: DbEndpoint,
        sql: String,
    },
    File {
        path: PathBuf,
        /// Spreadsheet sheet name (default: first sheet).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet: Option<String>,
    },
}

impl SourceConfig {
    /// Identifier recorded as `from_table` in the audit log.
    pub fn identifier(&self) -> String {
        match self {
            SourceConfig::Query { sql, .. } => sql.clone(),
            SourceConfig::File { path, .. } => path.display().to_string(),
        }
    }
}

/// Destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub connection: DbEndpoint,

    /// Destination table name.
    pub table: String,

    /// Destination schema. Required for schema introspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Load mode (default: append for queries, create_append for files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_mode: Option<LoadMode>,
}

/// How rows are written to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert into an existing table.
    Append,

    /// Create the table from the dataset's shape if absent, then insert.
    CreateAppend,

    /// Create if absent, delete existing rows, then insert.
    Truncate,
}

impl LoadMode {
    pub fn creates_table(&self) -> bool {
        !matches!(self, LoadMode::Append)
    }
}

/// Transform behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Missing value handling (default: drop).
    #[serde(default)]
    pub null_policy: NullPolicy,
}

/// Missing value handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Remove rows containing any missing value.
    #[default]
    Drop,

    /// Replace missing values with a typed zero/default.
    Fill,

    /// Leave missing values in place.
    #[serde(other)]
    Keep,
}

impl std::str::FromStr for NullPolicy {
    type Err = std::convert::Infallible;

    /// Unrecognized values mean `Keep`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "drop" => NullPolicy::Drop,
            "fill" => NullPolicy::Fill,
            _ => NullPolicy::Keep,
        })
    }
}

fn default_audit_table() -> String {
    "etl_process_log".to_string()
}
