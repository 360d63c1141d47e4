//! Common types for the assistant run lifecycle

use serde::{Deserialize, Serialize};

/// One remote execution of the assistant over a thread
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// Pending action requests; populated only when the run pauses with
    /// `RequiresAction`.
    pub pending_actions: Vec<ActionRequest>,
}

/// Execution status of a run as reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// Statuses this build does not know about yet
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Non-terminal statuses: keep polling until something changes.
    /// Unknown future statuses are treated as working so the turn deadline,
    /// not a parse mismatch, decides when to give up.
    pub fn is_working(self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling | RunStatus::Unknown
        )
    }

    /// Terminal statuses that end the turn without a usable reply
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Failed | RunStatus::Incomplete | RunStatus::Expired
        )
    }
}

/// A request from a paused run for one local action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Opaque call id; the eventual output must echo it
    pub call_id: String,
    pub name: String,
    /// Raw JSON argument bundle, validated by the action registry
    pub arguments: String,
}

/// Output of one serviced action, keyed by the originating call id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutput {
    pub call_id: String,
    pub output: String,
}

impl ActionOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}
