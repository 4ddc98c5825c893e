//! # Gradebook
//!
//! Student record datasets backed by spreadsheets.
//!
//! - [`Dataset`] / [`Row`]: ordered headers and fixed-arity rows
//! - [`ingest`]: first-sheet workbook parsing via `calamine`
//! - [`export`]: xlsx serialization via `rust_xlsxwriter`

mod dataset;
mod error;
pub mod export;
pub mod ingest;

pub use dataset::{Dataset, Row, RowRecord};
pub use error::{Error, Result};
pub use export::{export_file_name, save_workbook, write_workbook};
pub use ingest::{read_path, read_workbook};
