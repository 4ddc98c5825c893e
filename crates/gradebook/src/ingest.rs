//! Spreadsheet ingest.
//!
//! Reads the first worksheet of an xlsx/xlsm/xlsb/xls/ods workbook. The first
//! non-blank row is the header row; every later row up to the last non-blank
//! one becomes a [`Row`] keyed by those headers, blank rows included.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use tracing::{debug, info};

use crate::{Dataset, Result, Row};

/// Header given to columns whose header cell is blank.
pub const EMPTY_HEADER: &str = "__EMPTY";

/// Parse an in-memory workbook.
///
/// A workbook without sheets, or whose first sheet is blank, yields an empty
/// dataset rather than an error.
pub fn read_workbook(bytes: &[u8], name: impl Into<String>) -> Result<Dataset> {
    let name = name.into();
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let Some(range) = workbook.worksheet_range_at(0) else {
        debug!(file = %name, "Workbook has no worksheets");
        return Ok(Dataset::empty(name));
    };
    let range = range?;

    let grid: Vec<Vec<String>> = range
        .rows()
        .map(|cells| cells.iter().map(cell_text).collect())
        .collect();
    let is_blank = |cells: &Vec<String>| cells.iter().all(|c| c.is_empty());

    let Some(header_at) = grid.iter().position(|cells| !is_blank(cells)) else {
        debug!(file = %name, "First worksheet is blank");
        return Ok(Dataset::empty(name));
    };
    // Blank rows inside the data are kept; only the trailing run is dropped.
    let end = grid
        .iter()
        .rposition(|cells| !is_blank(cells))
        .map_or(header_at, |last| last + 1);

    let mut grid = grid.into_iter().take(end).skip(header_at);
    let raw_headers = grid.next().unwrap_or_default();
    let headers = normalize_headers(raw_headers);
    let width = headers.len();
    let rows: Vec<Row> = grid
        .map(|mut cells| {
            cells.resize(width, String::new());
            Row::new(cells)
        })
        .collect();

    info!(
        file = %name,
        columns = width,
        rows = rows.len(),
        "Loaded workbook"
    );

    Dataset::new(name, headers, rows)
}

/// Read a workbook from disk, using the file name as the display name.
pub fn read_path(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    read_workbook(&bytes, name)
}

/// Render a cell as display text. Whole floats print without a fraction.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Blank headers become `__EMPTY`; repeats get `_1`, `_2`, ... suffixes.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for header in raw {
        let base = if header.trim().is_empty() {
            EMPTY_HEADER.to_string()
        } else {
            header
        };
        let mut candidate = base.clone();
        let mut n = 0;
        while headers.contains(&candidate) {
            n += 1;
            candidate = format!("{base}_{n}");
        }
        headers.push(candidate);
    }
    headers
}
