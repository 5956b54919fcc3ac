//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::traits::Dialect;
use crate::core::value::ColumnType;

/// MySQL dialect implementation, shared by MariaDB.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize, _column_type: ColumnType) -> String {
        "?".to_string()
    }

    fn columns_catalog_query(&self) -> String {
        "SELECT lower(COLUMN_NAME) AS column_name, lower(DATA_TYPE) AS data_type \
         FROM information_schema.COLUMNS \
         WHERE lower(TABLE_SCHEMA) = lower(?) AND lower(TABLE_NAME) = lower(?) \
         ORDER BY ORDINAL_POSITION"
            .to_string()
    }

    fn table_exists_query(&self, with_schema: bool) -> String {
        if with_schema {
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE lower(TABLE_SCHEMA) = lower(?) AND lower(TABLE_NAME) = lower(?)"
                .to_string()
        } else {
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND lower(TABLE_NAME) = lower(?)"
                .to_string()
        }
    }

    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::DateTime => "DATETIME(6)",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Binary => "LONGBLOB",
            ColumnType::Text | ColumnType::Unknown => "LONGTEXT",
        }
    }

    fn max_bind_params(&self) -> usize {
        65_535
    }

    fn audit_table_ddl(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             process_name VARCHAR(255) NOT NULL, \
             status VARCHAR(20) NOT NULL, \
             details TEXT, \
             start_time DATETIME(6), \
             end_time DATETIME(6), \
             from_table TEXT NOT NULL, \
             to_table VARCHAR(255) NOT NULL)",
            self.qualified_table(schema, table)
        )
    }

    fn is_already_exists_error(&self, message: &str) -> bool {
        message.contains("already exists") || message.contains("1050")
    }

    // TRUNCATE commits implicitly
    fn truncate_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("DELETE FROM {}", self.qualified_table(schema, table))
    }
}
