//! Hosted assistant service abstraction
//!
//! The orchestrator only ever talks to the remote assistant through the
//! `AssistantService` trait, which keeps the turn loop testable against a
//! scripted fake.

mod error;
mod openai;
mod types;

pub use error::{AssistantError, AssistantErrorKind};
pub use openai::{AssistantConfig, OpenAiAssistant};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Remote assistant service contract: conversation (thread) management,
/// run lifecycle, and tool-output submission.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Create a new empty thread and return its handle
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a user message to a thread, strictly after all prior messages
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError>;

    /// Start a run of the configured assistant over a thread
    async fn create_run(&self, thread_id: &str) -> Result<Run, AssistantError>;

    /// Fetch the current state of a run
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Submit serviced action outputs back to a paused run, as one batch
    async fn submit_action_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ActionOutput],
    ) -> Result<Run, AssistantError>;

    /// Text of the most recent assistant-authored message in the thread
    async fn latest_assistant_reply(&self, thread_id: &str)
        -> Result<Option<String>, AssistantError>;
}

/// Logging wrapper for assistant services
pub struct LoggingAssistant {
    inner: Arc<dyn AssistantService>,
}

impl LoggingAssistant {
    pub fn new(inner: Arc<dyn AssistantService>) -> Self {
        Self { inner }
    }

    async fn observe<T>(
        op: &'static str,
        fut: impl std::future::Future<Output = Result<T, AssistantError>>,
    ) -> Result<T, AssistantError> {
        let start = Instant::now();
        let result = fut.await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::debug!(
                    op,
                    duration_ms = %duration.as_millis(),
                    "Assistant call completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    op,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Assistant call failed"
                );
            }
        }

        result
    }
}

#[async_trait]
impl AssistantService for LoggingAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        Self::observe("create_thread", self.inner.create_thread()).await
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        Self::observe("add_user_message", self.inner.add_user_message(thread_id, text)).await
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, AssistantError> {
        Self::observe("create_run", self.inner.create_run(thread_id)).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        Self::observe("get_run", self.inner.get_run(thread_id, run_id)).await
    }

    async fn submit_action_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ActionOutput],
    ) -> Result<Run, AssistantError> {
        Self::observe(
            "submit_action_outputs",
            self.inner.submit_action_outputs(thread_id, run_id, outputs),
        )
        .await
    }

    async fn latest_assistant_reply(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        Self::observe(
            "latest_assistant_reply",
            self.inner.latest_assistant_reply(thread_id),
        )
        .await
    }
}
