//! Destination schema introspection.
//!
//! Reads column names and declared types from the destination engine's
//! catalog (`ALL_TAB_COLUMNS` on Oracle, `information_schema.COLUMNS`
//! elsewhere). Lookups never fail the run: problems yield an empty map.

use tracing::{debug, error, info};

use crate::core::{ColumnTypeMap, Connection};

/// Read the destination table's columns.
///
/// Returns an empty map, logging an error, when `schema` is absent or the
/// catalog query fails. Schema and table are bound as parameters and
/// matched case-insensitively.
pub async fn get_destination_schema(
    conn: &dyn Connection,
    table: &str,
    schema: Option<&str>,
) -> ColumnTypeMap {
    let kind = conn.kind();
    let Some(schema) = schema.map(str::trim).filter(|s| !s.is_empty()) else {
        error!("Schema name is required for {}.", kind);
        return ColumnTypeMap::new();
    };

    match conn.table_columns(schema, table).await {
        Ok(columns) => {
            let map: ColumnTypeMap = columns.into_iter().collect();
            if map.is_empty() {
                info!("No catalog columns found for {}.{} on {}", schema, table, kind);
            } else {
                debug!("Destination schema for {}.{}: {:?}", schema, table, map);
            }
            map
        }
        Err(e) => {
            error!(
                "Error fetching columns and types for {} (Schema: {}): {}",
                kind, schema, e
            );
            ColumnTypeMap::new()
        }
    }
}
