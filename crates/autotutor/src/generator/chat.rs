//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use gradebook::RowRecord;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::prompt::{DEFAULT_SYSTEM_PROMPT, system_instruction, user_message};
use super::{CommentGenerator, EMPTY_RESPONSE, MISSING_API_KEY};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};

/// Connection settings for the text-generation endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Full chat completions URL.
    pub endpoint: String,
    pub model: String,
    /// Bearer token. Without it every row resolves to a fixed error value.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout. A timeout counts as a transient failure.
    pub request_timeout_secs: u64,
    /// Characters of an error body kept in the cell value.
    pub error_body_limit: usize,
    /// System instruction template; `{TARGET_COLUMN}` is substituted.
    pub system_prompt: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
                .to_string(),
            model: "qwen-plus".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 512,
            request_timeout_secs: 60,
            error_body_limit: 50,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("error_body_limit", &self.error_body_limit)
            .field("system_prompt", &self.system_prompt.is_some())
            .finish()
    }
}

impl GeneratorConfig {
    fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// A single failed request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key is missing")]
    MissingApiKey,

    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AI returned empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// 429, 5xx and transport failures (timeouts included) are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Transport(_) => true,
            Self::MissingApiKey | Self::EmptyResponse | Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Request client for chat completions with retry.
pub struct ChatCompletionClient {
    http: Client,
    config: GeneratorConfig,
    retry: RetryPolicy,
}

impl ChatCompletionClient {
    pub fn new(config: GeneratorConfig, retry: RetryPolicy) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Generate a comment, retrying transient failures.
    pub async fn complete(
        &self,
        record: &RowRecord,
        target_column: &str,
    ) -> Result<String, RetryError<GenerationError>> {
        let Some(api_key) = self.config.usable_api_key() else {
            return Err(RetryError::Permanent(GenerationError::MissingApiKey));
        };

        let template = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let system = system_instruction(template, target_column);
        let user = user_message(record, target_column);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let request = &request;
        let row = record.index();
        retry_with_backoff(&self.retry, GenerationError::is_transient, move |attempt| {
            debug!(row, attempt, "Requesting completion");
            self.send_once(api_key, request)
        })
        .await
    }

    async fn send_once(
        &self,
        api_key: &str,
        request: &ChatRequest<'_>,
    ) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Http { status, body });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content)
    }

    /// The cell value written for a failed row.
    pub fn error_value(&self, err: &RetryError<GenerationError>) -> String {
        match err {
            RetryError::Permanent(GenerationError::MissingApiKey) => MISSING_API_KEY.to_string(),
            RetryError::Permanent(GenerationError::EmptyResponse) => EMPTY_RESPONSE.to_string(),
            RetryError::Permanent(cause) => format!("Error: {}", self.describe(cause)),
            RetryError::Exhausted { attempts, last } => format!(
                "Error: max retries reached after {attempts} attempts ({})",
                self.describe(last)
            ),
        }
    }

    fn describe(&self, err: &GenerationError) -> String {
        let limit = self.config.error_body_limit;
        match err {
            GenerationError::Http { status, body } => match status.as_u16() {
                400 => "HTTP 400 Bad Request (check prompt size).".to_string(),
                code @ (401 | 403) => {
                    format!("HTTP {code} Invalid API key or access restricted.")
                }
                429 => "HTTP 429 Rate limit exceeded.".to_string(),
                code => format!("HTTP {code} {}", truncate(body.trim(), limit)),
            },
            GenerationError::Transport(e) if e.is_timeout() => "request timed out".to_string(),
            GenerationError::Transport(e) => truncate(&e.to_string(), limit),
            GenerationError::Malformed(detail) => {
                format!("malformed response: {}", truncate(detail, limit))
            }
            GenerationError::MissingApiKey | GenerationError::EmptyResponse => err.to_string(),
        }
    }
}

#[async_trait]
impl CommentGenerator for ChatCompletionClient {
    async fn generate(&self, record: &RowRecord, target_column: &str) -> String {
        match self.complete(record, target_column).await {
            Ok(comment) => comment,
            Err(err) => {
                warn!(row = record.index(), error = %err, "Comment generation failed");
                self.error_value(&err)
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn client() -> ChatCompletionClient {
        ChatCompletionClient::new(GeneratorConfig::default(), RetryPolicy::default()).unwrap()
    }

    #[rstest]
    #[case(429, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(400, false)]
    #[case(401, false)]
    #[case(403, false)]
    #[case(404, false)]
    fn test_http_status_classification(#[case] code: u16, #[case] transient: bool) {
        let error = GenerationError::Http {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        };
        assert_eq!(error.is_transient(), transient);
    }

    #[test]
    fn test_local_failures_are_permanent() {
        assert!(!GenerationError::EmptyResponse.is_transient());
        assert!(!GenerationError::MissingApiKey.is_transient());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 50), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("导数极值点偏移", 2), "导数...");
    }

    #[test]
    fn test_error_values_carry_prefix() {
        let client = client();
        let cases = [
            RetryError::Permanent(GenerationError::MissingApiKey),
            RetryError::Permanent(GenerationError::EmptyResponse),
            RetryError::Permanent(GenerationError::Http {
                status: StatusCode::FORBIDDEN,
                body: "denied".into(),
            }),
            RetryError::Exhausted {
                attempts: 10,
                last: GenerationError::Http {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: String::new(),
                },
            },
        ];
        for case in &cases {
            assert!(super::super::is_error_value(&client.error_value(case)));
        }
    }

    #[test]
    fn test_unknown_status_body_is_truncated() {
        let client = client();
        let value = client.error_value(&RetryError::Permanent(GenerationError::Http {
            status: StatusCode::NOT_FOUND,
            body: "x".repeat(80),
        }));
        assert_eq!(value, format!("Error: HTTP 404 {}...", "x".repeat(50)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = GeneratorConfig {
            api_key: Some("sk-secret".into()),
            ..GeneratorConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = GeneratorConfig {
            api_key: Some("   ".into()),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.usable_api_key(), None);
    }
}
