//! Core traits for engine-agnostic ETL.
//!
//! - [`Dialect`]: SQL syntax strategy for a database engine
//! - [`Connection`]: a live database handle
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` isolates per-engine SQL differences
//! - **Template Method**: `Connection` drivers implement `query`/`execute`;
//!   catalog lookups, table creation, transactional loads and audit upserts
//!   are default methods built on top of those two and the dialect.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{EtlError, Result};

use super::dataset::{Column, Dataset};
use super::kind::DbKind;
use super::record::AuditEntry;
use super::value::{ColumnType, SqlValue};

/// Maximum rows per INSERT statement.
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Column types of the audit row parameters, in [`AuditEntry::row_params`] order.
const AUDIT_ROW_TYPES: [ColumnType; 7] = [
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::DateTime,
    ColumnType::DateTime,
    ColumnType::Text,
    ColumnType::Text,
];

/// Statements implementing the audit upsert for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditUpsertSql {
    /// Single `MERGE` statement bound with [`AuditEntry::row_params`].
    Merge(String),

    /// Count by key, then update (bound with [`AuditEntry::update_params`])
    /// or insert (bound with [`AuditEntry::row_params`]).
    Portable {
        exists: String,
        update: String,
        insert: String,
    },
}

/// One parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// SQL dialect strategy for a database engine.
pub trait Dialect: Send + Sync {
    /// Dialect name (e.g., "postgres", "oracle").
    fn name(&self) -> &str;

    /// Quote an identifier for this engine.
    fn quote_ident(&self, name: &str) -> String;

    /// Optionally schema-qualified, quoted table name.
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema.filter(|s| !s.is_empty()) {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            None => self.quote_ident(table),
        }
    }

    /// Bind placeholder for the 1-based parameter `index` carrying values of `column_type`.
    fn param_placeholder(&self, index: usize, column_type: ColumnType) -> String;

    /// Catalog query returning (column_name, data_type) lower-cased and in
    /// ordinal order. Binds schema then table, compared case-insensitively.
    fn columns_catalog_query(&self) -> String;

    /// Query returning a count of tables matching the name. Binds
    /// (schema, table) when `with_schema`, otherwise (table) against the
    /// session's current schema.
    fn table_exists_query(&self, with_schema: bool) -> String;

    /// Column type used when creating a table from a dataset.
    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str;

    /// Maximum bind parameters in one statement.
    fn max_bind_params(&self) -> usize;

    /// Audit log upsert statements.
    fn audit_upsert(&self, schema: Option<&str>, table: &str) -> AuditUpsertSql {
        let table = self.qualified_table(schema, table);
        let key = |start: usize| {
            format!(
                "process_name = {} AND from_table = {} AND to_table = {}",
                self.param_placeholder(start, ColumnType::Text),
                self.param_placeholder(start + 1, ColumnType::Text),
                self.param_placeholder(start + 2, ColumnType::Text),
            )
        };

        let exists = format!("SELECT COUNT(*) FROM {} WHERE {}", table, key(1));
        let update = format!(
            "UPDATE {} SET status = {}, details = {}, end_time = {} WHERE {}",
            table,
            self.param_placeholder(1, ColumnType::Text),
            self.param_placeholder(2, ColumnType::Text),
            self.param_placeholder(3, ColumnType::DateTime),
            key(4)
        );
        let values = AUDIT_ROW_TYPES
            .iter()
            .enumerate()
            .map(|(i, ty)| self.param_placeholder(i + 1, *ty))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} (process_name, status, details, start_time, end_time, from_table, to_table) VALUES ({})",
            table, values
        );

        AuditUpsertSql::Portable {
            exists,
            update,
            insert,
        }
    }

    /// DDL creating the audit log table.
    fn audit_table_ddl(&self, schema: Option<&str>, table: &str) -> String;

    /// Whether a driver error message means the table already exists.
    fn is_already_exists_error(&self, message: &str) -> bool;

    /// Cheap round-trip query.
    fn ping_sql(&self) -> &'static str {
        "SELECT 1"
    }

    /// CREATE TABLE matching a dataset's columns.
    fn create_table_sql(&self, schema: Option<&str>, table: &str, columns: &[Column]) -> String {
        let cols = columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    self.quote_ident(&c.name),
                    self.column_type_ddl(c.column_type)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", self.qualified_table(schema, table), cols)
    }

    /// Multi-row INSERT for `rows` rows of `columns`.
    fn insert_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        columns: &[Column],
        rows: usize,
    ) -> String {
        let col_list = columns
            .iter()
            .map(|c| self.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut idx = 0;
        let tuples = (0..rows)
            .map(|_| {
                let values = columns
                    .iter()
                    .map(|c| {
                        idx += 1;
                        self.param_placeholder(idx, c.column_type)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", values)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified_table(schema, table),
            col_list,
            tuples
        )
    }

    /// INSERT statements writing every row of `data`, chunked to the
    /// statement and bind limits.
    fn insert_statements(
        &self,
        schema: Option<&str>,
        table: &str,
        data: &Dataset,
    ) -> Vec<Statement> {
        if data.is_empty() || data.columns.is_empty() {
            return Vec::new();
        }

        let per_statement =
            (self.max_bind_params() / data.columns.len()).clamp(1, INSERT_CHUNK_ROWS);

        data.rows
            .chunks(per_statement)
            .map(|chunk| {
                Statement::new(
                    self.insert_sql(schema, table, &data.columns, chunk.len()),
                    chunk.iter().flatten().cloned().collect(),
                )
            })
            .collect()
    }

    /// Remove all rows from a table. Must roll back with the enclosing
    /// transaction.
    fn truncate_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualified_table(schema, table))
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }
}

/// Interpret a single-cell count result.
pub fn count_value(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Int(n) => *n,
        SqlValue::Float(f) => *f as i64,
        SqlValue::Text(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        SqlValue::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn cell_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        // Some catalogs report names with a binary collation
        SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_text().unwrap_or_default(),
    }
}

/// A live handle to one database.
///
/// Drivers implement [`query`](Connection::query) and
/// [`execute`](Connection::execute); everything else has a default built on
/// those and the engine's [`Dialect`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Engine behind this handle.
    fn kind(&self) -> DbKind;

    /// SQL dialect for this engine.
    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement that returns rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Dataset>;

    /// Run a statement that returns no rows. Returns the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Column names and declared types of a table, in ordinal order.
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<(String, String)>> {
        let sql = self.dialect().columns_catalog_query();
        debug!("Catalog query: {}", sql);
        let result = self.query(&sql, &[schema.into(), table.into()]).await?;
        Ok(result
            .rows
            .iter()
            .filter(|row| row.len() >= 2)
            .map(|row| (cell_text(&row[0]), cell_text(&row[1])))
            .collect())
    }

    /// Check if a table exists.
    async fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        let schema = schema.filter(|s| !s.is_empty());
        let sql = self.dialect().table_exists_query(schema.is_some());
        let params: Vec<SqlValue> = match schema {
            Some(s) => vec![s.into(), table.into()],
            None => vec![table.into()],
        };
        let result = self.query(&sql, &params).await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.first())
            .map(count_value)
            .unwrap_or(0)
            > 0)
    }

    /// Create a table with the dataset's column layout.
    async fn create_table(&self, schema: Option<&str>, table: &str, columns: &[Column]) -> Result<()> {
        let sql = self.dialect().create_table_sql(schema, table, columns);
        debug!("Create table: {}", sql);
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Run statements as one transaction: either all of them commit or none do.
    ///
    /// Returns the summed affected row counts. The default sends the
    /// dialect's BEGIN, COMMIT and ROLLBACK through
    /// [`execute`](Connection::execute), so it only holds for handles whose
    /// calls all reach one session. Pooled drivers override it to pin a
    /// single connection for the whole transaction.
    async fn execute_in_transaction(&self, statements: &[Statement]) -> Result<u64> {
        let dialect = self.dialect();
        self.execute(dialect.begin_sql(), &[]).await?;

        let mut affected = 0u64;
        for stmt in statements {
            match self.execute(&stmt.sql, &stmt.params).await {
                Ok(n) => affected += n,
                Err(e) => {
                    if let Err(rollback) = self.execute(dialect.rollback_sql(), &[]).await {
                        warn!("Rollback failed: {}", rollback);
                    }
                    return Err(e);
                }
            }
        }

        self.execute(dialect.commit_sql(), &[]).await?;
        Ok(affected)
    }

    /// Write every row of a dataset in one transaction, first deleting the
    /// table's existing rows when `replace` is set.
    ///
    /// Returns the number of rows written. On failure the table is left as
    /// it was.
    async fn load_rows(
        &self,
        schema: Option<&str>,
        table: &str,
        data: &Dataset,
        replace: bool,
    ) -> Result<u64> {
        let dialect = self.dialect();
        let mut statements = Vec::new();
        if replace {
            statements.push(Statement::new(dialect.truncate_sql(schema, table), Vec::new()));
        }
        let inserts = dialect.insert_statements(schema, table, data);
        let written = if inserts.is_empty() {
            0
        } else {
            data.row_count() as u64
        };
        statements.extend(inserts);

        if statements.is_empty() {
            return Ok(0);
        }
        debug!(
            "Writing {} rows to {} in {} statement(s)",
            written,
            table,
            statements.len()
        );
        self.execute_in_transaction(&statements).await?;
        Ok(written)
    }

    /// Insert or update one audit row keyed by (process_name, from_table, to_table).
    async fn upsert_audit(&self, schema: Option<&str>, table: &str, entry: &AuditEntry) -> Result<()> {
        match self.dialect().audit_upsert(schema, table) {
            AuditUpsertSql::Merge(sql) => {
                let affected = self.execute(&sql, &entry.row_params()).await?;
                debug!("Audit merge affected {} row(s)", affected);
            }
            AuditUpsertSql::Portable {
                exists,
                update,
                insert,
            } => {
                let found = self.query(&exists, &entry.key_params()).await?;
                let count = found
                    .rows
                    .first()
                    .and_then(|row| row.first())
                    .map(count_value)
                    .unwrap_or(0);
                if count > 0 {
                    self.execute(&update, &entry.update_params()).await?;
                } else {
                    self.execute(&insert, &entry.row_params()).await?;
                }
            }
        }
        Ok(())
    }

    /// Create the audit log table if it does not exist.
    ///
    /// Returns true if the table was created.
    async fn create_audit_table(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        if self.table_exists(schema, table).await? {
            return Ok(false);
        }
        let sql = self.dialect().audit_table_ddl(schema, table);
        match self.execute(&sql, &[]).await {
            Ok(_) => Ok(true),
            Err(e) if self.dialect().is_already_exists_error(&e.to_string()) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Round-trip the server.
    async fn ping(&self) -> Result<()> {
        self.query(self.dialect().ping_sql(), &[])
            .await
            .map(|_| ())
            .map_err(|e| EtlError::connection(self.kind(), e))
    }

    /// Release pooled resources.
    async fn close(&self) {}
}
