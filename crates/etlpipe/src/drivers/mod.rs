//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`oracle`]: Oracle over ODBC
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL and MariaDB driver
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Connection`: query/execute against a live pool
//!
//! Connections hold their dialect as a [`DialectImpl`] built by
//! [`DialectImpl::for_kind`], so dialect calls are statically dispatched.
//!
//! [`DriverConnectionProvider`] selects the driver once per endpoint from its
//! [`DbKind`]; the rest of the engine only sees `Arc<dyn Connection>`.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `Connection`
//! 3. Add a variant to `DbKind` and `DialectImpl`
//! 4. Route the kind in `DriverConnectionProvider::connect`

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

// Re-export common utilities
pub use common::SslMode;

// Re-export driver types
pub use mssql::{MssqlConnection, MssqlDialect};
pub use mysql::{MysqlConnection, MysqlDialect};
pub use oracle::{OracleConnection, OracleDialect};
pub use postgres::{PostgresConnection, PostgresDialect};

use crate::config::DbEndpoint;
use crate::core::traits::{AuditUpsertSql, Connection, Dialect};
use crate::core::{Column, ColumnType, DbKind};
use crate::error::{EtlError, Result};

/// Enum-based static dispatch for dialects.
///
/// MariaDB shares the MySQL variant.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Oracle(OracleDialect),
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Oracle($d) => $call,
            DialectImpl::Postgres($d) => $call,
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Mssql($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        dispatch!(self, d => d.qualified_table(schema, table))
    }

    fn param_placeholder(&self, index: usize, column_type: ColumnType) -> String {
        dispatch!(self, d => d.param_placeholder(index, column_type))
    }

    fn columns_catalog_query(&self) -> String {
        dispatch!(self, d => d.columns_catalog_query())
    }

    fn table_exists_query(&self, with_schema: bool) -> String {
        dispatch!(self, d => d.table_exists_query(with_schema))
    }

    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str {
        dispatch!(self, d => d.column_type_ddl(column_type))
    }

    fn max_bind_params(&self) -> usize {
        dispatch!(self, d => d.max_bind_params())
    }

    fn audit_upsert(&self, schema: Option<&str>, table: &str) -> AuditUpsertSql {
        dispatch!(self, d => d.audit_upsert(schema, table))
    }

    fn audit_table_ddl(&self, schema: Option<&str>, table: &str) -> String {
        dispatch!(self, d => d.audit_table_ddl(schema, table))
    }

    fn is_already_exists_error(&self, message: &str) -> bool {
        dispatch!(self, d => d.is_already_exists_error(message))
    }

    fn ping_sql(&self) -> &'static str {
        dispatch!(self, d => d.ping_sql())
    }

    fn create_table_sql(&self, schema: Option<&str>, table: &str, columns: &[Column]) -> String {
        dispatch!(self, d => d.create_table_sql(schema, table, columns))
    }

    fn insert_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        columns: &[Column],
        rows: usize,
    ) -> String {
        dispatch!(self, d => d.insert_sql(schema, table, columns, rows))
    }

    fn truncate_sql(&self, schema: Option<&str>, table: &str) -> String {
        dispatch!(self, d => d.truncate_sql(schema, table))
    }

    fn begin_sql(&self) -> &'static str {
        dispatch!(self, d => d.begin_sql())
    }

    fn commit_sql(&self) -> &'static str {
        dispatch!(self, d => d.commit_sql())
    }

    fn rollback_sql(&self) -> &'static str {
        dispatch!(self, d => d.rollback_sql())
    }
}

impl DialectImpl {
    /// Dialect for a database kind.
    pub fn for_kind(kind: DbKind) -> Self {
        match kind {
            DbKind::Oracle => DialectImpl::Oracle(OracleDialect::new()),
            DbKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            DbKind::Mysql | DbKind::Mariadb => DialectImpl::Mysql(MysqlDialect::new()),
            DbKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
        }
    }

    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        db_type.parse::<DbKind>().map(Self::for_kind)
    }
}

/// Opens live connections for endpoints.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connect to an endpoint, failing with [`EtlError::Connection`].
    async fn connect(&self, endpoint: &DbEndpoint) -> Result<Arc<dyn Connection>>;
}

/// Provider backed by the real database drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnectionProvider;

impl DriverConnectionProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionProvider for DriverConnectionProvider {
    async fn connect(&self, endpoint: &DbEndpoint) -> Result<Arc<dyn Connection>> {
        let result: Result<Arc<dyn Connection>> = match endpoint.kind {
            DbKind::Oracle => OracleConnection::connect(endpoint)
                .await
                .map(|c| Arc::new(c) as Arc<dyn Connection>),
            DbKind::Postgres => PostgresConnection::connect(endpoint)
                .await
                .map(|c| Arc::new(c) as Arc<dyn Connection>),
            DbKind::Mysql | DbKind::Mariadb => MysqlConnection::connect(endpoint)
                .await
                .map(|c| Arc::new(c) as Arc<dyn Connection>),
            DbKind::Mssql => MssqlConnection::connect(endpoint)
                .await
                .map(|c| Arc::new(c) as Arc<dyn Connection>),
        };

        result.map_err(|e| {
            error!(
                "Failed to connect to {} at {}:{}: {}",
                endpoint.kind,
                endpoint.host,
                endpoint.port(),
                e
            );
            match e {
                EtlError::Connection { .. } => e,
                other => EtlError::connection(endpoint.kind, other),
            }
        })
    }
}
