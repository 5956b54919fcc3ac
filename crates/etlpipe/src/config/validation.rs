//! Configuration validation.

use super::{Config, DbEndpoint, SourceConfig};
use crate::error::{EtlError, Result};

fn validate_endpoint(label: &str, endpoint: &DbEndpoint) -> Result<()> {
    if endpoint.host.trim().is_empty() {
        return Err(EtlError::Config(format!("{}.host is required", label)));
    }
    if endpoint.database.trim().is_empty() {
        return Err(EtlError::Config(format!("{}.database is required", label)));
    }
    if endpoint.user.trim().is_empty() {
        return Err(EtlError::Config(format!("{}.user is required", label)));
    }
    if endpoint.port == Some(0) {
        return Err(EtlError::Config(format!("{}.port must be non-zero", label)));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("audit.connection", &config.audit.connection)?;
    if config.audit.table.trim().is_empty() {
        return Err(EtlError::Config("audit.table is required".into()));
    }

    match &config.source {
        SourceConfig::Query { connection, sql } => {
            validate_endpoint("source.query.connection", connection)?;
            if sql.trim().is_empty() {
                return Err(EtlError::Config("source.query.sql is required".into()));
            }
        }
        SourceConfig::File { path, .. } => {
            if path.as_os_str().is_empty() {
                return Err(EtlError::Config("source.file.path is required".into()));
            }
        }
    }

    validate_endpoint("destination.connection", &config.destination.connection)?;
    if config.destination.table.trim().is_empty() {
        return Err(EtlError::Config("destination.table is required".into()));
    }

    Ok(())
}
