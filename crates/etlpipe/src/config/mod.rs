//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{EtlError, Result};
use std::path::Path;

/// ODBC driver used for Oracle endpoints that do not name one.
pub const DEFAULT_ORACLE_ODBC_DRIVER: &str = "Oracle ODBC Driver";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Passwords named by `password_env` are read from the environment here.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.resolve_passwords()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// All configured endpoints with a label, audit first.
    pub fn endpoints(&self) -> Vec<(&'static str, &DbEndpoint)> {
        let mut endpoints = vec![("audit", &self.audit.connection)];
        if let SourceConfig::Query { connection, .. } = &self.source {
            endpoints.push(("source", connection));
        }
        endpoints.push(("destination", &self.destination.connection));
        endpoints
    }

    fn resolve_passwords(&mut self) -> Result<()> {
        self.audit.connection.resolve_password()?;
        if let SourceConfig::Query { connection, .. } = &mut self.source {
            connection.resolve_password()?;
        }
        self.destination.connection.resolve_password()
    }
}

impl DbEndpoint {
    /// Replace `password` with the value of `password_env`, if set.
    pub fn resolve_password(&mut self) -> Result<()> {
        if let Some(var) = &self.password_env {
            self.password = std::env::var(var).map_err(|_| {
                EtlError::Config(format!("password_env '{}' is not set", var))
            })?;
        }
        Ok(())
    }

    /// Build an ODBC connection string for Oracle.
    pub fn odbc_connection_string(&self) -> String {
        let driver = self
            .driver
            .as_deref()
            .unwrap_or(DEFAULT_ORACLE_ODBC_DRIVER)
            .trim_matches(|c| c == '{' || c == '}');
        format!(
            "Driver={{{}}};DBQ={}:{}/{};UID={};PWD={};",
            driver,
            self.host,
            self.port(),
            self.database,
            self.user,
            self.password
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbKind;

    const QUERY_YAML: &str = r#"
audit:
  connection:
    kind: oracle
    host: audit-db
    service_name: ORCLPDB1
    user: etl
    password: secret
source:
  query:
    connection:
      type: MySql
      host: src
      database: shop
      user: reader
      password: pw
    sql: SELECT id, name FROM customers
destination:
  connection:
    kind: postgres
    host: dst
    port: 6543
    database: warehouse
    user: loader
    password: pw
    ssl_mode: require
  table: customers
  schema: public
"#;

    #[test]
    fn test_from_yaml_query_source() {
        let config = Config::from_yaml(QUERY_YAML).unwrap();
        assert_eq!(config.audit.table, "etl_process_log");
        assert_eq!(config.audit.connection.kind, DbKind::Oracle);
        assert_eq!(config.audit.connection.port(), 1521);
        assert_eq!(config.destination.connection.port(), 6543);
        assert_eq!(config.transform.null_policy, NullPolicy::Drop);
        assert_eq!(config.load_mode(), LoadMode::Append);
        assert_eq!(config.endpoints().len(), 3);
        match &config.source {
            SourceConfig::Query { connection, sql } => {
                assert_eq!(connection.kind, DbKind::Mysql);
                assert!(sql.starts_with("SELECT"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_file_source_defaults_to_create_append() {
        let yaml = r#"
audit:
  connection: { kind: postgres, host: h, database: d, user: u }
source:
  file:
    path: data/orders.xlsx
    sheet: Q1
destination:
  connection: { kind: mssql, host: h, database: d, user: u }
  table: orders
transform:
  null_policy: whatever
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.load_mode(), LoadMode::CreateAppend);
        assert_eq!(config.transform.null_policy, NullPolicy::Keep);
        assert_eq!(config.source.identifier(), "data/orders.xlsx");
        assert_eq!(config.endpoints().len(), 2);
    }

    #[test]
    fn test_password_env_missing_is_config_error() {
        let yaml = QUERY_YAML.replace(
            "password: secret",
            "password_env: ETLPIPE_TEST_SURELY_UNSET_VAR",
        );
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::from_yaml(QUERY_YAML).unwrap();
        let debug = format!("{:?}", config.audit.connection);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_odbc_connection_string() {
        let mut endpoint = DbEndpoint::new(DbKind::Oracle, "db", "XEPDB1", "scott", "tiger");
        endpoint.driver = Some("{Oracle in instantclient_21}".into());
        assert_eq!(
            endpoint.odbc_connection_string(),
            "Driver={Oracle in instantclient_21};DBQ=db:1521/XEPDB1;UID=scott;PWD=tiger;"
        );
    }
}
