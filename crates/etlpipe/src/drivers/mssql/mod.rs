//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlConnection`]: Tiberius client pooled with bb8

mod dialect;

pub use dialect::MssqlDialect;

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{
    AuthMethod, Client, ColumnData, ColumnType as TdsType, Config, EncryptionLevel, FromSql,
    Query, Row,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::config::DbEndpoint;
use crate::core::traits::{Connection, Dialect, Statement};
use crate::core::{Column, ColumnType, Dataset, DbKind, SqlValue};
use crate::drivers::common::SslMode;
use crate::drivers::DialectImpl;
use crate::error::{EtlError, Result};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const POOL_MAX_SIZE: u32 = 4;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    endpoint: DbEndpoint,
}

impl TiberiusConnectionManager {
    pub fn new(endpoint: DbEndpoint) -> Self {
        Self { endpoint }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.endpoint.host);
        config.port(self.endpoint.port());
        config.database(&self.endpoint.database);
        config.authentication(AuthMethod::sql_server(
            &self.endpoint.user,
            &self.endpoint.password,
        ));

        match self.endpoint.ssl_mode {
            SslMode::Disable if !self.endpoint.trust_server_cert => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            _ => {
                config.encryption(EncryptionLevel::Required);
            }
        }
        if self.endpoint.trust_server_cert {
            config.trust_cert();
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL connection.
pub struct MssqlConnection {
    pool: Pool<TiberiusConnectionManager>,
    dialect: DialectImpl,
}

impl MssqlConnection {
    /// Connect and verify with a round trip.
    pub async fn connect(endpoint: &DbEndpoint) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(endpoint.clone());
        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .build(manager)
            .await
            .map_err(|e| EtlError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| EtlError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{}",
            endpoint.host,
            endpoint.port(),
            endpoint.database
        );

        Ok(Self {
            pool,
            dialect: DialectImpl::for_kind(DbKind::Mssql),
        })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| EtlError::pool(e, "getting MSSQL connection"))
    }
}

/// Run a parameterless batch, draining its results.
async fn run_batch(conn: &mut Client<Compat<TcpStream>>, sql: &str) -> Result<()> {
    debug!("MSSQL batch: {}", sql);
    conn.simple_query(sql).await?.into_results().await?;
    Ok(())
}

fn build_query<'a>(sql: &'a str, params: &'a [SqlValue]) -> Query<'a> {
    let mut query = Query::new(sql);
    for param in params {
        match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::Bytes(v) => query.bind(v.as_slice()),
        }
    }
    query
}

fn column_type(ty: TdsType) -> ColumnType {
    match ty {
        TdsType::Bit | TdsType::Bitn => ColumnType::Boolean,
        TdsType::Int1 | TdsType::Int2 | TdsType::Int4 | TdsType::Int8 | TdsType::Intn => {
            ColumnType::Integer
        }
        TdsType::Float4
        | TdsType::Float8
        | TdsType::Floatn
        | TdsType::Money
        | TdsType::Money4
        | TdsType::Decimaln
        | TdsType::Numericn => ColumnType::Float,
        TdsType::Datetime
        | TdsType::Datetime4
        | TdsType::Datetimen
        | TdsType::Datetime2
        | TdsType::Daten
        | TdsType::DatetimeOffsetn => ColumnType::DateTime,
        TdsType::BigVarBin | TdsType::BigBinary | TdsType::Image => ColumnType::Binary,
        TdsType::BigVarChar
        | TdsType::BigChar
        | TdsType::NVarchar
        | TdsType::NChar
        | TdsType::Text
        | TdsType::NText
        | TdsType::Guid => ColumnType::Text,
        _ => ColumnType::Unknown,
    }
}

/// Convert a Tiberius cell to SqlValue.
fn cell_value(data: &ColumnData<'static>) -> Result<SqlValue> {
    Ok(match data {
        ColumnData::Bit(v) => (*v).into(),
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => (*v).into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => (*v).into(),
        ColumnData::Numeric(v) => v
            .map(|n| n.value() as f64 / 10f64.powi(i32::from(n.scale())))
            .into(),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        ColumnData::Binary(v) => v.as_ref().map(|b| b.to_vec()).into(),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(data)?.into()
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(data)?.into(),
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql(data)?
            .map(|dt| dt.naive_utc())
            .into(),
        _ => SqlValue::Null,
    })
}

fn row_values(row: Row) -> Result<Vec<SqlValue>> {
    row.into_iter().map(|data| cell_value(&data)).collect()
}

#[async_trait]
impl Connection for MssqlConnection {
    fn kind(&self) -> DbKind {
        DbKind::Mssql
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset> {
        debug!("MSSQL query: {}", sql);
        let mut conn = self.get_conn().await?;
        let mut stream = build_query(sql, params).query(&mut *conn).await?;

        let columns: Vec<Column> = stream
            .columns()
            .await?
            .map(|cols| {
                cols.iter()
                    .map(|c| Column::new(c.name(), column_type(c.column_type())))
                    .collect()
            })
            .unwrap_or_default();

        let rows = stream.into_first_result().await?;
        let mut data = Dataset::new(columns);
        for row in rows {
            data.rows.push(row_values(row)?);
        }
        Ok(data)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("MSSQL execute: {}", sql);
        let mut conn = self.get_conn().await?;
        let result = build_query(sql, params).execute(&mut *conn).await?;
        Ok(result.total())
    }

    async fn execute_in_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        // Transaction control runs as a plain batch; opened inside sp_executesql
        // it would not outlive the call
        run_batch(&mut conn, self.dialect.begin_sql()).await?;

        let mut affected = 0u64;
        for stmt in statements {
            debug!("MSSQL execute: {}", stmt.sql);
            match build_query(&stmt.sql, &stmt.params).execute(&mut *conn).await {
                Ok(result) => affected += result.total(),
                Err(e) => {
                    if let Err(rollback) = run_batch(&mut conn, self.dialect.rollback_sql()).await {
                        warn!("Rollback failed: {}", rollback);
                    }
                    return Err(e.into());
                }
            }
        }

        run_batch(&mut conn, self.dialect.commit_sql()).await?;
        Ok(affected)
    }
}
