//! Destination loading.
//!
//! | Mode | Table absent | Table present |
//! |------|--------------|---------------|
//! | `append` | insert fails | insert |
//! | `create_append` | create, insert | insert |
//! | `truncate` | create, insert | delete all rows, insert |
//!
//! Deleting and inserting run in one transaction, so a failed load leaves
//! the table's previous rows in place.

use tracing::{debug, info};

use crate::config::LoadMode;
use crate::core::{Connection, Dataset};
use crate::error::{EtlError, Result};

/// Load `data` into `table` and return the number of rows written.
pub async fn load(
    conn: &dyn Connection,
    data: &Dataset,
    schema: Option<&str>,
    table: &str,
    mode: LoadMode,
) -> Result<u64> {
    info!(
        "Attempting to load {} rows into the table {} ({:?})",
        data.row_count(),
        table,
        mode
    );

    let mut replace = false;
    if mode.creates_table() {
        let created = ensure_table(conn, data, schema, table)
            .await
            .map_err(|e| EtlError::load(table, e))?;
        replace = !created && mode == LoadMode::Truncate;
    }

    let written = conn
        .load_rows(schema, table, data, replace)
        .await
        .map_err(|e| EtlError::load(table, e))?;
    if replace {
        info!("Replaced the existing rows of table '{}'", table);
    }
    info!("Loaded {} rows into the table {}", written, table);
    Ok(written)
}

/// Create the table from the dataset's shape when it does not exist.
///
/// Returns true if the table was created. A concurrent "already exists"
/// failure counts as present.
async fn ensure_table(
    conn: &dyn Connection,
    data: &Dataset,
    schema: Option<&str>,
    table: &str,
) -> Result<bool> {
    if conn.table_exists(schema, table).await? {
        info!("Table '{}' already exists.", table);
        return Ok(false);
    }

    info!("Table '{}' does not exist. Creating table...", table);
    match conn.create_table(schema, table, &data.columns).await {
        Ok(()) => {
            info!("Table '{}' created successfully.", table);
            Ok(true)
        }
        Err(e) if conn.dialect().is_already_exists_error(&e.to_string()) => {
            debug!("Table '{}' appeared concurrently: {}", table, e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
