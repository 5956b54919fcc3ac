//! Flat-file sources: CSV and spreadsheets.
//!
//! CSV cells arrive as text and each column's type is inferred from all of
//! its non-missing cells. Spreadsheet cells carry their own types; columns
//! mixing integers and floats widen to float, any other mix becomes text.
//!
//! Blank cells and the usual missing-value markers (`NULL`, `NA`, `N/A`,
//! `NaN`, `None`, `#N/A` ...) read as NULL in both formats.

use std::fmt;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{info, warn};

use crate::core::dataset::unify_column;
use crate::core::value::parse_datetime;
use crate::core::{Column, ColumnType, Dataset, SqlValue};
use crate::error::{EtlError, Result};

/// Supported flat-file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Spreadsheet,
}

impl FileType {
    /// Label used in process names (`ETL_Excel_...`, `ETL_Csv_...`).
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Csv => "Csv",
            FileType::Spreadsheet => "Excel",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a file by extension (case-insensitive).
pub fn detect_file_type(path: &Path) -> Option<FileType> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "csv" => Some(FileType::Csv),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileType::Spreadsheet),
        _ => None,
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(names.len(), String::new());
        raw.push(row);
    }

    let types: Vec<ColumnType> = (0..names.len())
        .map(|idx| infer_text_column(raw.iter().map(|row| row[idx].as_str())))
        .collect();

    let mut data = Dataset::new(
        names
            .iter()
            .zip(&types)
            .map(|(name, ty)| Column::new(name.as_str(), *ty))
            .collect(),
    );
    data.rows = raw
        .iter()
        .map(|row| {
            row.iter()
                .zip(&types)
                .map(|(cell, ty)| parse_text_cell(cell, *ty))
                .collect()
        })
        .collect();
    data.normalize_columns();

    info!(
        "CSV file loaded with {} rows and {} columns.",
        data.row_count(),
        data.columns.len()
    );
    Ok(data)
}

/// Cell spellings read as missing values, matched after trimming.
const NA_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// True for blank cells and missing-value markers.
fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || NA_MARKERS.contains(&trimmed)
}

/// Narrowest type every non-missing cell parses as. All-missing columns are text.
fn infer_text_column<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
    let mut values = cells.filter(|c| !is_missing(c)).map(str::trim).peekable();
    if values.peek().is_none() {
        return ColumnType::Text;
    }

    let all = |pred: fn(&str) -> bool| values.clone().all(pred);
    if all(|c| c.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if all(|c| c.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if all(|c| parse_bool(c).is_some()) {
        ColumnType::Boolean
    } else if all(|c| parse_datetime(c).is_some()) {
        ColumnType::DateTime
    } else {
        ColumnType::Text
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_text_cell(cell: &str, column_type: ColumnType) -> SqlValue {
    if is_missing(cell) {
        return SqlValue::Null;
    }
    let trimmed = cell.trim();
    let parsed = match column_type {
        ColumnType::Integer => trimmed.parse::<i64>().ok().map(SqlValue::Int),
        ColumnType::Float => trimmed.parse::<f64>().ok().map(SqlValue::Float),
        ColumnType::Boolean => parse_bool(trimmed).map(SqlValue::Bool),
        ColumnType::DateTime => parse_datetime(trimmed).map(SqlValue::DateTime),
        _ => None,
    };
    parsed.unwrap_or_else(|| SqlValue::Text(cell.to_string()))
}

/// Read one sheet of a spreadsheet. The first row is the header.
///
/// Without `sheet`, the first sheet is used, with a warning when the
/// workbook has several.
pub fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<Dataset> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(name) => {
            if !sheet_names.iter().any(|s| s == name) {
                return Err(EtlError::Extraction(format!(
                    "Sheet '{}' not found in {}. Available sheets: {:?}",
                    name,
                    path.display(),
                    sheet_names
                )));
            }
            name.to_string()
        }
        None => {
            let first = sheet_names.first().cloned().ok_or_else(|| {
                EtlError::Extraction(format!("{} contains no sheets", path.display()))
            })?;
            if sheet_names.len() > 1 {
                warn!(
                    "Multiple sheets found: {:?}. Defaulting to the first sheet.",
                    sheet_names
                );
            }
            first
        }
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();

    let Some(header) = rows.next() else {
        warn!("Sheet '{}' of {} is empty.", sheet_name, path.display());
        return Ok(Dataset::default());
    };
    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, cell)| match cell {
            Data::Empty => format!("unnamed_{}", idx),
            other => other.to_string(),
        })
        .collect();

    let mut columns: Vec<Vec<SqlValue>> = vec![Vec::new(); names.len()];
    let mut row_count = 0;
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get(idx).map(cell_value).unwrap_or(SqlValue::Null));
        }
        row_count += 1;
    }

    let (types, columns): (Vec<ColumnType>, Vec<Vec<SqlValue>>) =
        columns.into_iter().map(unify_column).unzip();

    let mut data = Dataset::new(
        names
            .iter()
            .zip(&types)
            .map(|(name, ty)| Column::new(name.as_str(), *ty))
            .collect(),
    );
    data.rows = (0..row_count)
        .map(|r| columns.iter().map(|col| col[r].clone()).collect())
        .collect();
    data.normalize_columns();

    if data.is_empty() {
        warn!("Excel file '{}' is empty or contains no data.", path.display());
    } else {
        info!(
            "Successfully extracted {} rows and {} columns from sheet '{}'.",
            data.row_count(),
            data.columns.len(),
            sheet_name
        );
    }
    Ok(data)
}

fn cell_value(cell: &Data) -> SqlValue {
    match cell {
        Data::Empty | Data::Error(_) => SqlValue::Null,
        Data::Int(v) => SqlValue::Int(*v),
        // Whole numbers come back as floats from most workbooks
        Data::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => SqlValue::Int(*v as i64),
        Data::Float(v) => SqlValue::Float(*v),
        Data::Bool(v) => SqlValue::Bool(*v),
        Data::String(s) if is_missing(s) => SqlValue::Null,
        Data::String(s) => SqlValue::Text(s.clone()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(SqlValue::DateTime)
            .unwrap_or_else(|| SqlValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) => parse_datetime(s)
            .map(SqlValue::DateTime)
            .unwrap_or_else(|| SqlValue::Text(s.clone())),
        Data::DurationIso(s) => SqlValue::Text(s.clone()),
    }
}
