//! Source extraction.
//!
//! - [`extract_query`]: run a query against a source connection
//! - [`extract_file`]: read a CSV or spreadsheet file
//!
//! Both return a dataset with normalized column names. An empty result is
//! not an error here; the orchestrator decides what an empty source means.

mod file;

pub use file::{detect_file_type, read_csv, read_spreadsheet, FileType};

use std::path::Path;

use tracing::{error, info, warn};

use crate::core::{Connection, Dataset};
use crate::error::{EtlError, Result};

/// Execute the source query verbatim.
pub async fn extract_query(conn: &dyn Connection, sql: &str) -> Result<Dataset> {
    let mut data = conn.query(sql, &[]).await.map_err(|e| {
        error!("Error extracting data from DB: {}", e);
        EtlError::Extraction(e.to_string())
    })?;
    data.normalize_columns();

    if data.is_empty() {
        warn!("No data returned for query: {}", sql);
    } else {
        info!(
            "Extracted {} rows and {} columns from the database.",
            data.row_count(),
            data.columns.len()
        );
    }
    Ok(data)
}

/// Read a flat file, dispatching on its extension.
///
/// A missing file or an unsupported extension is an extraction error.
pub fn extract_file(path: &Path, sheet: Option<&str>) -> Result<Dataset> {
    if !path.exists() {
        error!("File not found: {}", path.display());
        return Err(EtlError::Extraction(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let result = match detect_file_type(path) {
        Some(FileType::Csv) => read_csv(path),
        Some(FileType::Spreadsheet) => read_spreadsheet(path, sheet),
        None => {
            error!("Unsupported file format for file: {}", path.display());
            return Err(EtlError::Extraction(format!(
                "Unsupported file format for file: {}",
                path.display()
            )));
        }
    };

    result.map_err(|e| {
        error!("Error reading {}: {}", path.display(), e);
        match e {
            EtlError::Extraction(_) => e,
            other => EtlError::Extraction(other.to_string()),
        }
    })
}
