//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresConnection`]: pooled connection via deadpool-postgres
//!
//! Parameters are always sent as text and cast in SQL by the dialect's
//! placeholders, so statements are prepared with every parameter typed TEXT.

mod dialect;

pub use dialect::PostgresDialect;

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, Row};
use tracing::{debug, info, warn};

use crate::config::DbEndpoint;
use crate::core::traits::{Connection, Dialect, Statement};
use crate::core::{Column, ColumnType, Dataset, DbKind, SqlValue};
use crate::drivers::common::postgres_connector;
use crate::drivers::DialectImpl;
use crate::error::{EtlError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool size. Runs are sequential, so a few connections suffice.
const POOL_MAX_SIZE: usize = 4;

/// PostgreSQL connection.
pub struct PostgresConnection {
    pool: Pool,
    dialect: DialectImpl,
}

impl PostgresConnection {
    /// Connect and verify with a round trip.
    pub async fn connect(endpoint: &DbEndpoint) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&endpoint.host);
        pg_config.port(endpoint.port());
        pg_config.dbname(&endpoint.database);
        pg_config.user(&endpoint.user);
        pg_config.password(&endpoint.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match postgres_connector(endpoint.ssl_mode)? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(POOL_MAX_SIZE)
            .build()
            .map_err(|e| EtlError::pool(e, "creating PostgreSQL pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| EtlError::pool(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            endpoint.host,
            endpoint.port(),
            endpoint.database
        );

        Ok(Self {
            pool,
            dialect: DialectImpl::for_kind(DbKind::Postgres),
        })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| EtlError::pool(e, "getting PostgreSQL connection"))
    }
}

/// Text form of a parameter. Binary values use the `\x` hex bytea input format.
fn pg_param(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Bytes(b) => Some(format!("\\x{}", hex::encode(b))),
        SqlValue::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        other => other.to_text(),
    }
}

/// Column type for a PostgreSQL type name.
fn column_type(type_name: &str) -> ColumnType {
    match type_name {
        "bool" => ColumnType::Boolean,
        "int2" | "int4" | "int8" | "oid" => ColumnType::Integer,
        "float4" | "float8" | "numeric" | "money" => ColumnType::Float,
        "timestamp" | "timestamptz" | "date" => ColumnType::DateTime,
        "bytea" => ColumnType::Binary,
        "text" | "varchar" | "bpchar" | "name" | "char" | "uuid" | "json" | "jsonb" | "xml" => {
            ColumnType::Text
        }
        _ => ColumnType::Unknown,
    }
}

/// Convert a PostgreSQL row value to SqlValue.
fn row_value(row: &Row, idx: usize, type_name: &str) -> Result<SqlValue> {
    Ok(match type_name {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.into(),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.into(),
        "oid" => row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into(),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.into(),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)?
            .and_then(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d))
            .into(),
        "timestamp" => row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?.into(),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|dt| dt.naive_utc())
            .into(),
        "date" => row.try_get::<_, Option<chrono::NaiveDate>>(idx)?.into(),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| u.to_string())
            .into(),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| v.to_string())
            .into(),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .into(),
    })
}

#[async_trait]
impl Connection for PostgresConnection {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset> {
        debug!("PostgreSQL query: {}", sql);
        let client = self.client().await?;
        let stmt = client
            .prepare_typed(sql, &vec![Type::TEXT; params.len()])
            .await?;

        let text_params: Vec<Option<String>> = params.iter().map(pg_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = text_params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let rows = client.query(&stmt, &refs).await?;

        let type_names: Vec<&str> = stmt.columns().iter().map(|c| c.type_().name()).collect();
        let columns = stmt
            .columns()
            .iter()
            .zip(&type_names)
            .map(|(c, t)| Column::new(c.name(), column_type(t)))
            .collect();

        let mut data = Dataset::new(columns);
        for row in &rows {
            let values = type_names
                .iter()
                .enumerate()
                .map(|(idx, t)| row_value(row, idx, t))
                .collect::<Result<Vec<_>>>()?;
            data.rows.push(values);
        }
        Ok(data)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("PostgreSQL execute: {}", sql);
        let client = self.client().await?;
        let stmt = client
            .prepare_typed(sql, &vec![Type::TEXT; params.len()])
            .await?;
        let text_params: Vec<Option<String>> = params.iter().map(pg_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = text_params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        Ok(client.execute(&stmt, &refs).await?)
    }

    async fn execute_in_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let mut affected = 0u64;
        for stmt in statements {
            debug!("PostgreSQL execute: {}", stmt.sql);
            let prepared = tx
                .prepare_typed(&stmt.sql, &vec![Type::TEXT; stmt.params.len()])
                .await?;
            let text_params: Vec<Option<String>> = stmt.params.iter().map(pg_param).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = text_params
                .iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();
            affected += tx.execute(&prepared, &refs).await?;
        }

        // Rolled back on drop unless committed
        tx.commit().await?;
        Ok(affected)
    }

    async fn close(&self) {
        self.pool.close();
    }
}
