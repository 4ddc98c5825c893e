use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to render config: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Column '{name}' not found. Available columns: {available}")]
    UnknownColumn { name: String, available: String },

    #[error("Workbook has no data rows: {0}")]
    EmptyWorkbook(PathBuf),

    #[error(transparent)]
    Engine(#[from] autotutor_engine::Error),

    #[error(transparent)]
    Gradebook(#[from] gradebook::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
