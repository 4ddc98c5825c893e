//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::controller::JobController;
use crate::generator::{ChatCompletionClient, GeneratorConfig};
use crate::retry::RetryPolicy;
use crate::store::SessionStore;
use crate::worker_pool::PoolConfig;
use crate::{Error, Result};

/// All engine settings, deserializable from a single TOML/JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
    pub generator: GeneratorConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool.concurrency == 0 {
            return Err(Error::config("pool.concurrency must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(Error::config(
                "retry.max_delay_ms must not be below retry.base_delay_ms",
            ));
        }
        let endpoint = self.generator.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::config(format!(
                "generator.endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }
        if self.generator.model.trim().is_empty() {
            return Err(Error::config("generator.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(Error::config("generator.temperature must be within 0.0..=2.0"));
        }
        if self.generator.request_timeout_secs == 0 {
            return Err(Error::config("generator.request_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Validate and wire a controller backed by the chat completions client.
    pub fn build_controller(self, store: Arc<SessionStore>) -> Result<JobController> {
        self.validate()?;
        let client = ChatCompletionClient::new(self.generator, self.retry)?;
        Ok(JobController::new(store, Arc::new(client), self.pool))
    }
}
