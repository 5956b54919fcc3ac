//! Supported database engines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Database engine behind an endpoint.
///
/// Resolved once from configuration; everything engine-specific (driver,
/// dialect, catalog query) is selected from this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    #[serde(alias = "Oracle", alias = "ORACLE")]
    Oracle,
    #[serde(
        alias = "postgresql",
        alias = "Postgresql",
        alias = "PostgreSQL",
        alias = "pg"
    )]
    Postgres,
    #[serde(alias = "MySql", alias = "MySQL")]
    Mysql,
    #[serde(alias = "MariaDB", alias = "MariaDb")]
    Mariadb,
    #[serde(alias = "MSSQL", alias = "sqlserver", alias = "sql_server")]
    Mssql,
}

impl DbKind {
    pub const ALL: [DbKind; 5] = [
        DbKind::Oracle,
        DbKind::Postgres,
        DbKind::Mysql,
        DbKind::Mariadb,
        DbKind::Mssql,
    ];

    /// Name used in process names and log messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            DbKind::Oracle => "Oracle",
            DbKind::Postgres => "Postgresql",
            DbKind::Mysql => "MySql",
            DbKind::Mariadb => "MariaDB",
            DbKind::Mssql => "MSSQL",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DbKind::Oracle => 1521,
            DbKind::Postgres => 5432,
            DbKind::Mysql | DbKind::Mariadb => 3306,
            DbKind::Mssql => 1433,
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DbKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oracle" => Ok(DbKind::Oracle),
            "postgres" | "postgresql" | "pg" => Ok(DbKind::Postgres),
            "mysql" => Ok(DbKind::Mysql),
            "mariadb" => Ok(DbKind::Mariadb),
            "mssql" | "sqlserver" | "sql_server" => Ok(DbKind::Mssql),
            other => Err(EtlError::Config(format!(
                "Unknown database type: '{}'. Supported types: oracle, postgres, mysql, mariadb, mssql",
                other
            ))),
        }
    }
}
