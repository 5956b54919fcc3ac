//! Destination column metadata.

use serde::Serialize;

use super::dataset::normalize_column_name;

/// Destination column name to declared type name, in catalog ordinal order.
///
/// Names are stored normalized; lookups normalize their argument, so they are
/// case-insensitive. Types are kept exactly as the catalog reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnTypeMap {
    entries: Vec<(String, String)>,
}

impl ColumnTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column. A later entry for an existing name replaces its type.
    pub fn insert(&mut self, name: &str, data_type: impl Into<String>) {
        let name = normalize_column_name(name);
        let data_type = data_type.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = data_type,
            None => self.entries.push((name, data_type)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = normalize_column_name(name);
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: AsRef<str>, T: Into<String>> FromIterator<(N, T)> for ColumnTypeMap {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut map = ColumnTypeMap::new();
        for (name, data_type) in iter {
            map.insert(name.as_ref(), data_type);
        }
        map
    }
}
