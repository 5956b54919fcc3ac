//! Dataset transformation before load.
//!
//! Steps, in order: normalize column names, remove duplicate rows, apply the
//! null policy, then project onto the destination columns in destination
//! order. Column set differences are reported as warnings only.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::NullPolicy;
use crate::core::{normalize_column_name, Dataset};
use crate::error::{EtlError, Result};

/// Transform `data` for loading into a table with `destination_columns`.
///
/// `source_columns` are the names the source was expected to produce; names
/// missing from the dataset are reported.
pub fn transform(
    mut data: Dataset,
    source_columns: &[String],
    destination_columns: &[String],
    null_policy: NullPolicy,
) -> Result<Dataset> {
    info!("Initial dataset columns: {:?}", data.column_names());
    info!(
        "Initial dataset shape: ({}, {})",
        data.row_count(),
        data.columns.len()
    );

    let width = data.columns.len();
    if let Some(idx) = data.rows.iter().position(|row| row.len() != width) {
        return Err(EtlError::Transform(format!(
            "row {} has {} cells, expected {}",
            idx,
            data.rows[idx].len(),
            width
        )));
    }

    data.normalize_columns();

    let duplicates = data.dedup_rows();
    if duplicates > 0 {
        info!("Removed {} duplicate rows", duplicates);
    }

    match null_policy {
        NullPolicy::Drop => {
            let dropped = data.drop_null_rows();
            if dropped > 0 {
                info!("Dropped {} rows with missing values", dropped);
            }
        }
        NullPolicy::Fill => {
            let filled = data.fill_nulls();
            if filled > 0 {
                info!("Filled {} missing values", filled);
            }
        }
        NullPolicy::Keep => {}
    }

    let destination: Vec<String> = destination_columns
        .iter()
        .map(|c| normalize_column_name(c))
        .collect();
    let present: HashSet<String> = data.column_names().into_iter().collect();
    let wanted: HashSet<&str> = destination.iter().map(String::as_str).collect();

    let missing_from_data: Vec<String> = source_columns
        .iter()
        .map(|c| normalize_column_name(c))
        .filter(|c| !present.contains(c))
        .collect();
    if !missing_from_data.is_empty() {
        warn!(
            "The following source columns are missing in the data: {:?}",
            missing_from_data
        );
    }

    let not_in_destination: Vec<String> = data
        .column_names()
        .into_iter()
        .filter(|c| !wanted.contains(c.as_str()))
        .collect();
    if !not_in_destination.is_empty() {
        warn!(
            "The following columns are in the source but not in the destination: {:?}",
            not_in_destination
        );
    }

    let matching: Vec<String> = destination
        .into_iter()
        .filter(|c| present.contains(c))
        .collect();
    let projected = data.project(&matching);

    info!(
        "Transformed dataset shape: ({}, {})",
        projected.row_count(),
        projected.columns.len()
    );
    Ok(projected)
}
