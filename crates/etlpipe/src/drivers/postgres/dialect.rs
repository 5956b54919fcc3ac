//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Every parameter is sent as text, so placeholders carry an explicit cast to
//! the column's type.

use crate::core::traits::Dialect;
use crate::core::value::ColumnType;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize, column_type: ColumnType) -> String {
        let cast = match column_type {
            ColumnType::Integer => "bigint",
            ColumnType::Float => "float8",
            ColumnType::DateTime => "timestamp",
            ColumnType::Boolean => "boolean",
            ColumnType::Binary => "bytea",
            ColumnType::Text | ColumnType::Unknown => "text",
        };
        format!("${}::{}", index, cast)
    }

    fn columns_catalog_query(&self) -> String {
        "SELECT lower(column_name) AS column_name, lower(data_type) AS data_type \
         FROM information_schema.columns \
         WHERE lower(table_schema) = lower($1::text) AND lower(table_name) = lower($2::text) \
         ORDER BY ordinal_position"
            .to_string()
    }

    fn table_exists_query(&self, with_schema: bool) -> String {
        if with_schema {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower($1::text) AND lower(table_name) = lower($2::text)"
                .to_string()
        } else {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND lower(table_name) = lower($1::text)"
                .to_string()
        }
    }

    fn column_type_ddl(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::DateTime => "TIMESTAMP",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Binary => "BYTEA",
            ColumnType::Text | ColumnType::Unknown => "TEXT",
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
             start_time TIMESTAMP, \
             end_time TIMESTAMP, \
             from_table TEXT NOT NULL, \
             to_table VARCHAR(255) NOT NULL)",
            self.qualified_table(schema, table)
        )
    }

    fn is_already_exists_error(&self, message: &str) -> bool {
        message.contains("already exists") || message.contains("42P07")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Column;
    use crate::core::traits::AuditUpsertSql;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("my\"col"), "\"my\"\"col\"");
        assert_eq!(dialect.qualified_table(Some("public"), "Users"), "\"public\".\"Users\"");
        assert_eq!(dialect.qualified_table(None, "users"), "\"users\"");
    }

    #[test]
    fn test_typed_placeholders() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1, ColumnType::Integer), "$1::bigint");
        assert_eq!(dialect.param_placeholder(3, ColumnType::DateTime), "$3::timestamp");
        assert_eq!(dialect.param_placeholder(4, ColumnType::Unknown), "$4::text");
    }

    #[test]
    fn test_create_table_sql() {
        let dialect = PostgresDialect::new();
        let sql = dialect.create_table_sql(
            Some("public"),
            "orders",
            &[
                Column::new("id", ColumnType::Integer),
                Column::new("placed_at", ColumnType::DateTime),
            ],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"orders\" (\"id\" BIGINT, \"placed_at\" TIMESTAMP)"
        );
    }

    #[test]
    fn test_audit_upsert_is_portable() {
        let dialect = PostgresDialect::new();
        match dialect.audit_upsert(Some("audit"), "etl_process_log") {
            AuditUpsertSql::Portable { update, .. } => {
                assert!(update.starts_with("UPDATE \"audit\".\"etl_process_log\" SET status = $1::text"));
                assert!(update.contains("end_time = $3::timestamp"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_already_exists() {
        let dialect = PostgresDialect::new();
        assert!(dialect.is_already_exists_error("relation \"t\" already exists"));
        assert!(!dialect.is_already_exists_error("permission denied"));
    }
}
