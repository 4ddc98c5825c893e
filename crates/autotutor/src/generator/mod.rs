//! Comment generators.
//!
//! A generator turns one row into the text for the target column. It never
//! fails past its boundary: failures come back as cell values starting with
//! [`ERROR_PREFIX`].

mod chat;
mod prompt;

pub use chat::{ChatCompletionClient, GenerationError, GeneratorConfig};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, TARGET_COLUMN_PLACEHOLDER, system_instruction, user_message};

use async_trait::async_trait;
use gradebook::RowRecord;

/// Every error cell value starts with this.
pub const ERROR_PREFIX: &str = "Error:";

/// Written to every row when no API key is configured.
pub const MISSING_API_KEY: &str =
    "Error: API key is missing. Set AUTOTUTOR_API_KEY or api_key in the config file.";

/// Written when the endpoint answers with no usable text.
pub const EMPTY_RESPONSE: &str = "Error: AI returned empty response.";

/// Produces the target-column text for one row.
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    /// Generated text, or an error value starting with [`ERROR_PREFIX`].
    async fn generate(&self, record: &RowRecord, target_column: &str) -> String;
}

/// Whether a cell holds an error value rather than generated text.
pub fn is_error_value(value: &str) -> bool {
    value.starts_with(ERROR_PREFIX)
}
