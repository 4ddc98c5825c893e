//! # AutoTutor engine
//!
//! Fills one column of a student gradebook with AI-written comments, one
//! request per row, through a pausable and resumable batch run.
//!
//! - [`SessionStore`]: dataset, target column and run state behind one mutex
//! - [`JobController`]: start / pause / resume / stop
//! - [`WorkerPool`]: bounded, staggered dispatch with a single join point
//! - [`generator`]: the comment generator seam and the chat completions client
//! - [`retry_with_backoff`]: exponential backoff with jitter

pub mod config;
pub mod controller;
mod error;
pub mod generator;
pub mod retry;
pub mod signal;
pub mod store;
pub mod worker_pool;

pub use config::EngineConfig;
pub use controller::{JobController, RunEvent, RunReport};
pub use error::{Error, Result};
pub use generator::{
    ChatCompletionClient, CommentGenerator, GenerationError, GeneratorConfig, is_error_value,
};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
pub use signal::RunSignal;
pub use store::{RunMode, RunOutcome, RunPhase, RunPlan, RunSnapshot, SessionStore, progress_percent};
pub use worker_pool::{DispatchSummary, PoolConfig, WorkerPool};
