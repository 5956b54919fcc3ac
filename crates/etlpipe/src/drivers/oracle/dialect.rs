//! Oracle SQL dialect (Strategy pattern).
//!
//! Parameters travel over ODBC as text; timestamp and binary placeholders
//! wrap the bind in the matching conversion function.

use crate::core::dataset::Column;
use crate::core::traits::{AuditUpsertSql, Dialect};
use crate::core::value::ColumnType;

const TIMESTAMP_FORMAT: &str = "YYYY-MM-DD HH24:MI:SS.FF6";

/// Oracle dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Create a new Oracle dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn is_simple_ident(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '#')
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &str {
        "oracle"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Simple names fold to upper case, matching how Oracle stores unquoted identifiers
        if Self::is_simple_ident(name) {
            format!("\"{}\"", name.to_uppercase())
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    fn param_placeholder(&self, _index: usize, column_type: ColumnType) -> String {
        match column_type {
            ColumnType::DateTime => format!("TO_TIMESTAMP(?, '{}')", TIMESTAMP_FORMAT),
            ColumnType::Binary => "HEXTORAW(?)".to_string(),
            _ => "?".to_string(),
        }
    }

    fn columns_catalog_query(&self) -> String {
        "SELECT lower(COLUMN_NAME) AS column_name, lower(DATA_TYPE) AS data_type \
         FROM ALL_TAB_COLUMNS \
         WHERE upper(OWNER) = upper(?) AND upper(TABLE_NAME) = upper(?) \
         ORDER BY COLUMN_ID"
            .to_string()
    }

    fn table_exists_query(&self, with_schema: bool) -> String {
        if with_schema {
            "SELECT COUNT(*) FROM ALL_TABLES \
             WHERE upper(OWNER) = upper(?) AND upper(TABLE_NAME) = upper(?)"
                .to_string()
        } else {
            "SELECT COUNT(*) FROM USER_TABLES WHERE upper(TABLE_NAME) = upper(?)".to_string()
        }
    }

    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Integer => "NUMBER(19)",
            ColumnType::Float => "BINARY_DOUBLE",
            ColumnType::DateTime => "TIMESTAMP",
            ColumnType::Boolean => "NUMBER(1)",
            ColumnType::Binary => "BLOB",
            ColumnType::Text | ColumnType::Unknown => "VARCHAR2(4000)",
        }
    }

    fn max_bind_params(&self) -> usize {
        1_000
    }

    fn insert_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        columns: &[Column],
        rows: usize,
    ) -> String {
        let target = self.qualified_table(schema, table);
        let col_list = columns
            .iter()
            .map(|c| self.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let values = columns
            .iter()
            .map(|c| self.param_placeholder(0, c.column_type))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = String::from("INSERT ALL");
        for _ in 0..rows {
            sql.push_str(&format!(" INTO {} ({}) VALUES ({})", target, col_list, values));
        }
        sql.push_str(" SELECT 1 FROM dual");
        sql
    }

    fn audit_upsert(&self, schema: Option<&str>, table: &str) -> AuditUpsertSql {
        let ts = self.param_placeholder(0, ColumnType::DateTime);
        AuditUpsertSql::Merge(format!(
            "MERGE INTO {} target \
             USING (SELECT ? AS process_name, ? AS status, ? AS details, \
             {ts} AS start_time, {ts} AS end_time, ? AS from_table, ? AS to_table FROM dual) source \
             ON (target.process_name = source.process_name AND target.from_table = source.from_table \
             AND target.to_table = source.to_table) \
             WHEN MATCHED THEN \
             UPDATE SET status = source.status, details = source.details, end_time = source.end_time \
             WHEN NOT MATCHED THEN \
             INSERT (process_name, status, details, start_time, end_time, from_table, to_table) \
             VALUES (source.process_name, source.status, source.details, source.start_time, \
             source.end_time, source.from_table, source.to_table)",
            self.qualified_table(schema, table),
            ts = ts
        ))
    }

    fn audit_table_ddl(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\
             process_name VARCHAR2(255) NOT NULL, \
             status VARCHAR2(20) NOT NULL, \
             details VARCHAR2(4000), \
             start_time TIMESTAMP, \
             end_time TIMESTAMP, \
             from_table VARCHAR2(4000) NOT NULL, \
             to_table VARCHAR2(255) NOT NULL)",
            self.qualified_table(schema, table)
        )
    }

    fn is_already_exists_error(&self, message: &str) -> bool {
        message.contains("ORA-00955")
    }

    fn ping_sql(&self) -> &'static str {
        "SELECT 1 FROM dual"
    }

    // TRUNCATE is DDL and commits implicitly
    fn truncate_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("DELETE FROM {}", self.qualified_table(schema, table))
    }
}
