//! MSSQL SQL dialect (Strategy pattern).

use crate::core::traits::{AuditUpsertSql, Dialect};
use crate::core::value::ColumnType;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain closing brackets by doubling them
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize, column_type: ColumnType) -> String {
        match column_type {
            // NULL parameters go out as NVARCHAR, which never converts implicitly to binary
            ColumnType::Binary => format!("CAST(@P{} AS VARBINARY(MAX))", index),
            _ => format!("@P{}", index),
        }
    }

    fn columns_catalog_query(&self) -> String {
        "SELECT lower(COLUMN_NAME) AS column_name, lower(DATA_TYPE) AS data_type \
         FROM information_schema.COLUMNS \
         WHERE lower(TABLE_SCHEMA) = lower(@P1) AND lower(TABLE_NAME) = lower(@P2) \
         ORDER BY ORDINAL_POSITION"
            .to_string()
    }

    fn table_exists_query(&self, with_schema: bool) -> String {
        if with_schema {
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE lower(TABLE_SCHEMA) = lower(@P1) AND lower(TABLE_NAME) = lower(@P2)"
                .to_string()
        } else {
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = SCHEMA_NAME() AND lower(TABLE_NAME) = lower(@P1)"
                .to_string()
        }
    }

    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::DateTime => "DATETIME2",
            ColumnType::Boolean => "BIT",
            ColumnType::Binary => "VARBINARY(MAX)",
            ColumnType::Text | ColumnType::Unknown => "NVARCHAR(MAX)",
        }
    }

    fn max_bind_params(&self) -> usize {
        // Server limit is 2100 per RPC call
        2_000
    }

    fn audit_upsert(&self, schema: Option<&str>, table: &str) -> AuditUpsertSql {
        AuditUpsertSql::Merge(format!(
            "MERGE INTO {} AS target \
             USING (SELECT @P1 AS process_name, @P2 AS status, @P3 AS details, \
             @P4 AS start_time, @P5 AS end_time, @P6 AS from_table, @P7 AS to_table) AS source \
             ON (target.process_name = source.process_name AND target.from_table = source.from_table \
             AND target.to_table = source.to_table) \
             WHEN MATCHED THEN \
             UPDATE SET status = source.status, details = source.details, end_time = source.end_time \
             WHEN NOT MATCHED THEN \
             INSERT (process_name, status, details, start_time, end_time, from_table, to_table) \
             VALUES (source.process_name, source.status, source.details, source.start_time, \
             source.end_time, source.from_table, source.to_table);",
            self.qualified_table(schema, table)
        ))
    }

    fn audit_table_ddl(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\
             process_name NVARCHAR(255) NOT NULL, \
             status NVARCHAR(20) NOT NULL, \
             details NVARCHAR(MAX), \
             start_time DATETIME2, \
             end_time DATETIME2, \
             from_table NVARCHAR(4000) NOT NULL, \
             to_table NVARCHAR(255) NOT NULL)",
            self.qualified_table(schema, table)
        )
    }

    fn is_already_exists_error(&self, message: &str) -> bool {
        message.contains("There is already an object named") || message.contains("2714")
    }

    fn begin_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT TRANSACTION"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK TRANSACTION"
    }
}
