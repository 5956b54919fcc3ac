//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy for MySQL and MariaDB
//! - [`MysqlConnection`]: SQLx MySQL pool

mod dialect;

pub use dialect::MysqlDialect;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column as _, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::DbEndpoint;
use crate::core::traits::{Connection, Dialect, Statement};
use crate::core::{Column, ColumnType, Dataset, DbKind, SqlValue};
use crate::drivers::common::SslMode;
use crate::drivers::DialectImpl;
use crate::error::{EtlError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const POOL_MAX_SIZE: u32 = 4;

/// MySQL or MariaDB connection.
pub struct MysqlConnection {
    pool: MySqlPool,
    kind: DbKind,
    dialect: DialectImpl,
}

impl MysqlConnection {
    /// Connect and verify with a round trip.
    pub async fn connect(endpoint: &DbEndpoint) -> Result<Self> {
        let ssl_mode = match endpoint.ssl_mode {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        };

        let options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port())
            .database(&endpoint.database)
            .username(&endpoint.user)
            .password(&endpoint.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_SIZE)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| EtlError::pool(e, "creating MySQL pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| EtlError::pool(e, "testing MySQL connection"))?;

        info!(
            "Connected to {}: {}:{}/{}",
            endpoint.kind,
            endpoint.host,
            endpoint.port(),
            endpoint.database
        );

        Ok(Self {
            pool,
            kind: endpoint.kind,
            dialect: DialectImpl::for_kind(endpoint.kind),
        })
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Column type for a MySQL type name as reported by SQLx.
fn column_type(type_name: &str) -> ColumnType {
    let name = type_name.to_lowercase();
    match name.split_whitespace().next().unwrap_or_default() {
        "boolean" | "bool" => ColumnType::Boolean,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            ColumnType::Integer
        }
        "float" | "double" | "real" | "decimal" | "numeric" => ColumnType::Float,
        "date" | "datetime" | "timestamp" => ColumnType::DateTime,
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit" => {
            ColumnType::Binary
        }
        "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set"
        | "json" | "time" => ColumnType::Text,
        _ => ColumnType::Unknown,
    }
}

/// Unsigned integers past `i64::MAX` keep their digits as text.
fn unsigned_value(v: u64) -> SqlValue {
    i64::try_from(v)
        .map(SqlValue::Int)
        .unwrap_or_else(|_| SqlValue::Text(v.to_string()))
}

/// Convert a MySQL row value to SqlValue.
fn row_value(row: &MySqlRow, idx: usize, type_name: &str) -> Result<SqlValue> {
    let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return Ok(SqlValue::Null);
    }

    let name = type_name.to_lowercase();
    let unsigned = name.contains("unsigned");
    Ok(match column_type(&name) {
        ColumnType::Boolean => row.try_get::<bool, _>(idx)?.into(),
        ColumnType::Integer if unsigned => unsigned_value(row.try_get::<u64, _>(idx)?),
        ColumnType::Integer => row.try_get::<i64, _>(idx)?.into(),
        ColumnType::Float if name.starts_with("decimal") || name.starts_with("numeric") => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .map(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d))?
            .into(),
        ColumnType::Float if name.starts_with("float") => {
            SqlValue::Float(f64::from(row.try_get::<f32, _>(idx)?))
        }
        ColumnType::Float => row.try_get::<f64, _>(idx)?.into(),
        ColumnType::DateTime if name == "date" => row.try_get::<chrono::NaiveDate, _>(idx)?.into(),
        ColumnType::DateTime => row.try_get::<chrono::NaiveDateTime, _>(idx)?.into(),
        ColumnType::Binary => row.try_get::<Vec<u8>, _>(idx)?.into(),
        ColumnType::Text if name == "time" => row
            .try_get::<chrono::NaiveTime, _>(idx)?
            .to_string()
            .into(),
        ColumnType::Text => row.try_get::<String, _>(idx)?.into(),
        ColumnType::Unknown => row
            .try_get::<String, _>(idx)
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    })
}

#[async_trait]
impl Connection for MysqlConnection {
    fn kind(&self) -> DbKind {
        self.kind
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset> {
        debug!("MySQL query: {}", sql);
        let rows = bind_params(sql, params).fetch_all(&self.pool).await?;

        let meta: Vec<(String, String)> = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
                .collect(),
            None => {
                let described = (&self.pool).describe(sql).await?;
                described
                    .columns()
                    .iter()
                    .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
                    .collect()
            }
        };

        let columns = meta
            .iter()
            .map(|(name, ty)| Column::new(name.as_str(), column_type(ty)))
            .collect();
        let mut data = Dataset::new(columns);
        for row in &rows {
            let values = meta
                .iter()
                .enumerate()
                .map(|(idx, (_, ty))| row_value(row, idx, ty))
                .collect::<Result<Vec<_>>>()?;
            data.rows.push(values);
        }

        let widened = data.unify_types();
        if !widened.is_empty() {
            warn!("Columns widened to hold out-of-range values: {:?}", widened);
        }
        Ok(data)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("MySQL execute: {}", sql);
        let result = bind_params(sql, params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_in_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for stmt in statements {
            debug!("MySQL execute: {}", stmt.sql);
            affected += bind_params(&stmt.sql, &stmt.params)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit().await?;
        Ok(affected)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
