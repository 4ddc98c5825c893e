//! Spreadsheet export.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::info;

use crate::{Dataset, Result};

/// Prefix of every exported file name.
pub const EXPORT_PREFIX: &str = "AutoTutor_";

/// Name of the single worksheet in an exported workbook.
pub const SHEET_NAME: &str = "Comments";

/// Serialize the dataset to xlsx bytes: a bold header row followed by one
/// row per record.
pub fn write_workbook(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in dataset.headers().iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (r, row) in dataset.rows().iter().enumerate() {
        for (c, value) in row.cells().iter().enumerate() {
            write_cell(sheet, r as u32 + 1, c as u16, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Write the dataset into `dir` under [`export_file_name`] and return the path.
pub fn save_workbook(dataset: &Dataset, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir.as_ref().join(export_file_name(dataset.name()));
    let bytes = write_workbook(dataset)?;
    std::fs::write(&path, &bytes)?;
    info!(
        path = %path.display(),
        rows = dataset.len(),
        bytes = bytes.len(),
        "Exported workbook"
    );
    Ok(path)
}

/// `AutoTutor_<stem>.xlsx`, or `AutoTutor_Export.xlsx` when there is no name.
pub fn export_file_name(display_name: &str) -> String {
    let stem = Path::new(display_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Export".to_string());
    format!("{EXPORT_PREFIX}{stem}.xlsx")
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    match canonical_number(value) {
        Some(number) => sheet.write_number(row, col, number)?,
        None => sheet.write_string(row, col, value)?,
    };
    Ok(())
}

/// The numeric value of `text` if printing that number reproduces `text`
/// exactly, so reading the cell back yields the same string.
fn canonical_number(text: &str) -> Option<f64> {
    let number: f64 = text.parse().ok()?;
    (number.is_finite() && number.to_string() == text).then_some(number)
}
