//! Oracle driver over ODBC.
//!
//! - [`OracleDialect`]: SQL syntax strategy for Oracle
//! - [`OracleConnection`]: ODBC environment plus connection string
//!
//! **Requirements:** an Oracle ODBC driver (Oracle Instant Client ODBC) must be
//! installed and registered under the name given by the endpoint's `driver`.
//!
//! ODBC calls block, so every statement runs on the blocking thread pool with a
//! fresh connection. Values are exchanged as text; cells longer than
//! [`MAX_CELL_BYTES`] fail the query rather than being cut short.

mod dialect;

pub use dialect::OracleDialect;

use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::{
    buffers::TextRowSet, ConnectionOptions, Cursor, DataType, Environment, IntoParameter,
    ResultSetMetadata,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DbEndpoint;
use crate::core::traits::{Connection, Dialect, Statement};
use crate::core::value::parse_datetime;
use crate::core::{Column, ColumnType, Dataset, DbKind, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{EtlError, Result};

/// Rows fetched per ODBC batch.
const FETCH_BATCH_ROWS: usize = 256;

/// Maximum bytes per text cell: the extended VARCHAR2 limit.
pub const MAX_CELL_BYTES: usize = 32_767;

/// Oracle connection.
pub struct OracleConnection {
    env: Arc<Environment>,
    connection_string: String,
    dialect: DialectImpl,
    /// Serializes ODBC operations.
    conn_mutex: Mutex<()>,
}

impl OracleConnection {
    /// Create the ODBC environment and verify the connection.
    pub async fn connect(endpoint: &DbEndpoint) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            EtlError::pool(
                format!(
                    "Failed to create ODBC environment: {}. Make sure an Oracle ODBC driver is installed.",
                    e
                ),
                "ODBC connection",
            )
        })?;
        let env = Arc::new(env);
        let connection_string = endpoint.odbc_connection_string();

        debug!(
            "ODBC connection (credentials hidden): DBQ={}:{}/{}",
            endpoint.host,
            endpoint.port(),
            endpoint.database
        );

        let check_env = Arc::clone(&env);
        let check_string = connection_string.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = check_env
                .connect_with_connection_string(&check_string, ConnectionOptions::default())
                .map_err(|e| {
                    EtlError::pool(
                        format!("Failed to connect to Oracle via ODBC: {}", e),
                        "ODBC connection",
                    )
                })?;
            conn.execute("SELECT 1 FROM dual", ())?;
            Ok(())
        })
        .await
        .map_err(|e| EtlError::pool(e, "ODBC connection"))??;

        info!(
            "Connected to Oracle via ODBC: {}:{}/{}",
            endpoint.host,
            endpoint.port(),
            endpoint.database
        );

        Ok(Self {
            env,
            connection_string,
            dialect: DialectImpl::for_kind(DbKind::Oracle),
            conn_mutex: Mutex::new(()),
        })
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(odbc_api::Connection<'_>) -> Result<T> + Send + 'static,
    {
        let _lock = self.conn_mutex.lock().await;
        let env = Arc::clone(&self.env);
        let connection_string = self.connection_string.clone();
        tokio::task::spawn_blocking(move || {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| EtlError::pool(e, "getting ODBC connection"))?;
            work(conn)
        })
        .await
        .map_err(|e| EtlError::pool(e, "ODBC worker"))?
    }
}

fn column_type(data_type: DataType) -> ColumnType {
    match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
            ColumnType::Integer
        }
        DataType::Numeric { scale: 0, .. } | DataType::Decimal { scale: 0, .. } => {
            ColumnType::Integer
        }
        DataType::Numeric { .. }
        | DataType::Decimal { .. }
        | DataType::Float { .. }
        | DataType::Real
        | DataType::Double => ColumnType::Float,
        DataType::Date | DataType::Timestamp { .. } => ColumnType::DateTime,
        DataType::Bit => ColumnType::Boolean,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            ColumnType::Binary
        }
        _ => ColumnType::Text,
    }
}

/// Parse a text cell according to its column type.
fn text_value(text: Option<String>, column_type: ColumnType) -> SqlValue {
    let Some(text) = text else {
        return SqlValue::Null;
    };
    match column_type {
        ColumnType::Integer => text
            .trim()
            .parse::<i64>()
            .map(SqlValue::Int)
            .or_else(|_| text.trim().parse::<f64>().map(SqlValue::Float))
            .unwrap_or(SqlValue::Text(text)),
        ColumnType::Float => text
            .trim()
            .parse::<f64>()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Text(text)),
        ColumnType::DateTime => parse_datetime(&text)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Text(text)),
        ColumnType::Boolean => SqlValue::Bool(matches!(text.trim(), "1" | "true" | "TRUE")),
        ColumnType::Binary => hex::decode(text.trim())
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Text(text)),
        ColumnType::Text | ColumnType::Unknown => SqlValue::Text(text),
    }
}

fn text_params(params: &[SqlValue]) -> Vec<Option<String>> {
    params.iter().map(SqlValue::to_text).collect()
}

fn fetch_error(e: odbc_api::Error) -> EtlError {
    match e {
        odbc_api::Error::TooLargeValueForBuffer { .. } => too_long_cell(),
        other => other.into(),
    }
}

fn too_long_cell() -> EtlError {
    EtlError::Extraction(format!(
        "Query returned a value longer than {} bytes",
        MAX_CELL_BYTES
    ))
}

fn execute_bound(conn: &odbc_api::Connection<'_>, sql: &str, params: &[Option<String>]) -> Result<u64> {
    let bound: Vec<_> = params.iter().map(|p| p.as_deref().into_parameter()).collect();
    let mut stmt = conn.preallocate()?;
    stmt.execute(sql, bound.as_slice())?;
    Ok(stmt.row_count()?.unwrap_or(0) as u64)
}

fn fetch_dataset(conn: odbc_api::Connection<'_>, sql: &str, params: &[Option<String>]) -> Result<Dataset> {
    let bound: Vec<_> = params.iter().map(|p| p.as_deref().into_parameter()).collect();

    let Some(mut cursor) = conn.execute(sql, bound.as_slice())? else {
        return Ok(Dataset::default());
    };

    let num_cols = cursor.num_result_cols()? as u16;
    let mut columns = Vec::with_capacity(num_cols as usize);
    for col in 1..=num_cols {
        let name = cursor.col_name(col)?;
        let data_type = cursor.col_data_type(col)?;
        columns.push(Column::new(name.as_str(), column_type(data_type)));
    }

    let types: Vec<ColumnType> = columns.iter().map(|c| c.column_type).collect();
    let mut data = Dataset::new(columns);

    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH_ROWS, &mut cursor, Some(MAX_CELL_BYTES))?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers)?;
    while let Some(batch) = row_cursor
        .fetch_with_truncation_check(true)
        .map_err(fetch_error)?
    {
        for row_idx in 0..batch.num_rows() {
            let row = types
                .iter()
                .enumerate()
                .map(|(col_idx, ty)| {
                    let text = batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string());
                    text_value(text, *ty)
                })
                .collect();
            data.rows.push(row);
        }
    }

    let widened = data.unify_types();
    if !widened.is_empty() {
        debug!("Columns widened to hold mixed values: {:?}", widened);
    }
    Ok(data)
}

#[async_trait]
impl Connection for OracleConnection {
    fn kind(&self) -> DbKind {
        DbKind::Oracle
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset> {
        debug!("Oracle query: {}", sql);
        let sql = sql.to_string();
        let params = text_params(params);
        self.run_blocking(move |conn| fetch_dataset(conn, &sql, &params))
            .await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("Oracle execute: {}", sql);
        let sql = sql.to_string();
        let params = text_params(params);
        self.run_blocking(move |conn| execute_bound(&conn, &sql, &params))
            .await
    }

    async fn execute_in_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let statements: Vec<(String, Vec<Option<String>>)> = statements
            .iter()
            .map(|s| (s.sql.clone(), text_params(&s.params)))
            .collect();

        self.run_blocking(move |conn| {
            conn.set_autocommit(false)?;
            let outcome = statements.iter().try_fold(0u64, |affected, (sql, params)| {
                debug!("Oracle execute: {}", sql);
                Ok::<u64, EtlError>(affected + execute_bound(&conn, sql, params)?)
            });
            match outcome {
                Ok(affected) => {
                    conn.commit()?;
                    Ok(affected)
                }
                Err(e) => {
                    if let Err(rollback) = conn.rollback() {
                        warn!("Rollback failed: {}", rollback);
                    }
                    Err(e)
                }
            }
        })
        .await
    }
}
