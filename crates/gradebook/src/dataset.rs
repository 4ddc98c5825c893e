//! In-memory dataset model.
//!
//! A [`Dataset`] is an ordered list of headers plus an ordered list of rows of
//! exactly that arity. Rows are addressed by position only.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{Error, Result};

/// One record of the dataset. Cells are stored in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn get(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Ordered headers, ordered rows and the display name of the source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, checking that every row matches the header arity.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        for (i, header) in headers.iter().enumerate() {
            if headers[..i].contains(header) {
                return Err(Error::DuplicateColumn {
                    name: header.clone(),
                });
            }
        }

        if let Some((row, bad)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(Error::Shape {
                row,
                expected: headers.len(),
                found: bad.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            headers,
            rows,
        })
    }

    /// A dataset with no headers and no rows.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }

    /// Overwrite a single cell.
    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<String>) -> Result<()> {
        let col = self
            .column_index(column)
            .ok_or_else(|| Error::unknown_column(column))?;
        let len = self.rows.len();
        let target = self
            .rows
            .get_mut(row)
            .ok_or(Error::RowOutOfRange { index: row, len })?;
        target.cells[col] = value.into();
        Ok(())
    }

    /// A self-contained copy of row `index`, keyed by header.
    pub fn record(&self, index: usize) -> Option<RowRecord> {
        let row = self.rows.get(index)?;
        Some(RowRecord {
            index,
            fields: self
                .headers
                .iter()
                .cloned()
                .zip(row.cells.iter().cloned())
                .collect(),
        })
    }

    /// Records for rows `[start, len)`. Empty when `start >= len`.
    pub fn records_from(&self, start: usize) -> Vec<RowRecord> {
        (start..self.rows.len())
            .filter_map(|index| self.record(index))
            .collect()
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Option<Vec<&str>> {
        let col = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row.cells[col].as_str()).collect())
    }
}

/// An owned snapshot of one row with its absolute index, detached from the
/// dataset so it can be handed to concurrent workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    index: usize,
    fields: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new(index: usize, fields: Vec<(String, String)>) -> Self {
        Self { index, fields }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// JSON object of the row in header order.
    pub fn to_json(&self) -> String {
        // Serializing string pairs into a map cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Serializes as a JSON object whose keys keep header order.
impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
