//! In-memory tabular dataset moved between extraction and load.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::value::{ColumnType, SqlValue};

/// A named, typed column of a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered collection of named columns with row-major values.
///
/// Rows always have exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Normalize a column name: trim, lower-case, and collapse whitespace runs to `_`.
pub fn normalize_column_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Settle a column's cells on one type, converting cells where needed.
///
/// Integers mixed with floats widen to float; any other mix becomes text.
/// All-null columns are text.
pub(crate) fn unify_column(cells: Vec<SqlValue>) -> (ColumnType, Vec<SqlValue>) {
    let mut kinds = cells.iter().filter_map(ColumnType::of).collect::<Vec<_>>();
    kinds.sort_by_key(|k| *k as u8);
    kinds.dedup();

    match kinds.as_slice() {
        [] => (ColumnType::Text, cells),
        [single] => (*single, cells),
        [ColumnType::Integer, ColumnType::Float] => {
            let cells = cells
                .into_iter()
                .map(|v| match v {
                    SqlValue::Int(n) => SqlValue::Float(n as f64),
                    other => other,
                })
                .collect();
            (ColumnType::Float, cells)
        }
        _ => {
            let cells = cells
                .into_iter()
                .map(|v| match v {
                    SqlValue::Text(_) | SqlValue::Null => v,
                    other => other.to_text().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                })
                .collect();
            (ColumnType::Text, cells)
        }
    }
}

impl Dataset {
    /// Create an empty dataset with the given columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a dataset from rows, inferring each column's type from its
    /// first non-null value. All-null columns are `Unknown`.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let column_type = rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(ColumnType::of))
                    .next()
                    .unwrap_or(ColumnType::Unknown);
                Column::new(name, column_type)
            })
            .collect();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Normalize every column name in place.
    pub fn normalize_columns(&mut self) {
        for column in &mut self.columns {
            column.name = normalize_column_name(&column.name);
        }
    }

    /// Remove exact-duplicate rows, keeping the first occurrence.
    ///
    /// Returns the number of rows removed.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Remove rows with any null cell. Returns the number of rows removed.
    pub fn drop_null_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.iter().any(SqlValue::is_null));
        before - self.rows.len()
    }

    /// Replace null cells with the column type's default value.
    ///
    /// Returns the number of cells filled.
    pub fn fill_nulls(&mut self) -> usize {
        let defaults: Vec<SqlValue> = self
            .columns
            .iter()
            .map(|c| c.column_type.default_value())
            .collect();
        let mut filled = 0;
        for row in &mut self.rows {
            for (cell, default) in row.iter_mut().zip(&defaults) {
                if cell.is_null() && !default.is_null() {
                    *cell = default.clone();
                    filled += 1;
                }
            }
        }
        filled
    }

    /// Re-settle columns whose cells disagree with the declared type.
    ///
    /// Columns of unknown type are left alone. Returns the names of the
    /// columns that changed type.
    pub fn unify_types(&mut self) -> Vec<String> {
        let mut changed = Vec::new();
        for idx in 0..self.columns.len() {
            let declared = self.columns[idx].column_type;
            if declared == ColumnType::Unknown
                || self
                    .rows
                    .iter()
                    .all(|row| ColumnType::of(&row[idx]).map_or(true, |t| t == declared))
            {
                continue;
            }

            let cells = self
                .rows
                .iter_mut()
                .map(|row| std::mem::replace(&mut row[idx], SqlValue::Null))
                .collect();
            let (column_type, cells) = unify_column(cells);
            for (row, cell) in self.rows.iter_mut().zip(cells) {
                row[idx] = cell;
            }
            self.columns[idx].column_type = column_type;
            changed.push(self.columns[idx].name.clone());
        }
        changed
    }

    /// Keep only the named columns, in the given order. Unknown names are skipped.
    pub fn project(&self, names: &[String]) -> Dataset {
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        Dataset {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}
