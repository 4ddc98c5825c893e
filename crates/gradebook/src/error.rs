use thiserror::Error;

/// Result type for gradebook operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read workbook: {source}")]
    Read {
        #[from]
        source: calamine::Error,
    },

    #[error("failed to write workbook: {source}")]
    Write {
        #[from]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("row {row} has {found} cells but the dataset has {expected} columns")]
    Shape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column `{name}`")]
    DuplicateColumn { name: String },

    #[error("unknown column `{name}`")]
    UnknownColumn { name: String },

    #[error("row {index} is out of range (dataset has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
}

impl Error {
    pub fn unknown_column(name: impl Into<String>) -> Self {
        Self::UnknownColumn { name: name.into() }
    }
}
