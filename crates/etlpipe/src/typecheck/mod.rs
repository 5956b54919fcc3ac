//! Source/destination type compatibility.
//!
//! Each dataset column's classification (`int64`, `datetime64`, `text`, ...)
//! is matched against an ordered category table. The first category whose
//! name occurs in the classification decides which destination type
//! spellings are accepted; the destination type is compatible when it
//! contains any of them.

use serde::Serialize;
use tracing::error;

use crate::core::{ColumnTypeMap, Dataset};

/// A named class of compatible destination type spellings.
#[derive(Debug, Clone, Copy)]
pub struct TypeCategory {
    pub name: &'static str,
    pub accepted: &'static [&'static str],
}

/// Category table, evaluated in declaration order.
pub const TYPE_CATEGORIES: &[TypeCategory] = &[
    TypeCategory {
        name: "datetime",
        accepted: &["DATE", "TIMESTAMP", "DATETIME", "TIME", "YEAR", "DATETIME2", "SMALLDATETIME"],
    },
    TypeCategory {
        name: "int",
        accepted: &[
            "INT", "INTEGER", "NUMBER", "BIGINT", "TINYINT", "SMALLINT", "MEDIUMINT", "SERIAL",
            "BIGSERIAL",
        ],
    },
    TypeCategory {
        name: "float",
        accepted: &["FLOAT", "DECIMAL", "NUMERIC", "DOUBLE", "REAL", "MONEY", "SMALLMONEY"],
    },
    TypeCategory {
        name: "text",
        accepted: &["VARCHAR2", "VARCHAR", "CHAR", "TEXT", "CLOB", "NVARCHAR", "LONGTEXT", "NCHAR"],
    },
    TypeCategory {
        name: "bytes",
        accepted: &[
            "RAW", "BLOB", "CLOB", "VARBINARY", "BINARY", "LONGBLOB", "IMAGE", "TEXT", "BYTEA",
        ],
    },
    TypeCategory {
        name: "boolean",
        accepted: &["BOOLEAN", "BOOL", "BIT", "TINYINT(1)", "CHAR(1)"],
    },
    TypeCategory {
        name: "date",
        accepted: &["DATE", "DATETIME", "TIMESTAMP", "DATEONLY", "TIME", "YEAR", "DATETIME2"],
    },
    TypeCategory {
        name: "json",
        accepted: &["JSON", "JSONB", "TEXT", "LONGTEXT", "XML"],
    },
    TypeCategory {
        name: "uuid",
        accepted: &["UUID", "GUID", "CHAR(36)", "VARCHAR(36)", "UNIQUEIDENTIFIER"],
    },
    TypeCategory {
        name: "enum",
        accepted: &["ENUM", "SET"],
    },
    TypeCategory {
        name: "spatial",
        accepted: &[
            "POINT",
            "LINESTRING",
            "POLYGON",
            "GEOMETRY",
            "GEOGRAPHY",
            "GEOMETRYCOLLECTION",
            "MULTIPOINT",
            "MULTILINESTRING",
            "MULTIPOLYGON",
        ],
    },
    TypeCategory {
        name: "interval",
        accepted: &["INTERVAL", "TIME", "TIMEZONE", "DATE", "DATETIME"],
    },
    TypeCategory {
        name: "currency",
        accepted: &["MONEY", "SMALLMONEY", "DECIMAL(19,4)"],
    },
];

/// One incompatible column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMismatch {
    pub column: String,
    pub source_type: String,
    pub destination_type: String,
}

/// First category whose name occurs in the classification.
pub fn categorize(classification: &str) -> Option<&'static TypeCategory> {
    let classification = classification.to_lowercase();
    TYPE_CATEGORIES
        .iter()
        .find(|c| classification.contains(c.name))
}

/// Whether a source classification may load into a destination type.
pub fn is_compatible(classification: &str, destination_type: &str) -> bool {
    let destination = destination_type.to_uppercase();
    categorize(classification)
        .map(|c| c.accepted.iter().any(|spelling| destination.contains(spelling)))
        .unwrap_or(false)
}

/// Every dataset column present in `destination` whose type is incompatible.
///
/// Columns missing from `destination` are not checked. Each mismatch is
/// logged as an error.
pub fn find_type_mismatches(data: &Dataset, destination: &ColumnTypeMap) -> Vec<TypeMismatch> {
    data.columns
        .iter()
        .filter_map(|column| {
            let destination_type = destination.get(&column.name)?;
            let source_type = column.column_type.classification();
            if is_compatible(source_type, destination_type) {
                return None;
            }
            error!(
                "Data type mismatch for column '{}': Source type '{}' does not match DB type '{}'",
                column.name, source_type, destination_type
            );
            Some(TypeMismatch {
                column: column.name.clone(),
                source_type: source_type.to_string(),
                destination_type: destination_type.to_string(),
            })
        })
        .collect()
}

/// True when any column is incompatible with its destination type.
pub fn check_type_mismatch(data: &Dataset, destination: &ColumnTypeMap) -> bool {
    !find_type_mismatches(data, destination).is_empty()
}
