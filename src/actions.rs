//! Local actions serviced on behalf of paused assistant runs
//!
//! The assistant's side of the protocol (tool names and argument schemas)
//! is provisioned out-of-band; this registry only has to execute what a run
//! asks for and refuse what it cannot parse.

mod human_handoff;
mod order_status;

pub use human_handoff::HumanHandoffAction;
pub use order_status::OrderStatusAction;

use crate::db::Database;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Result of dispatching one action request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Output to feed back to the run
    Success(String),
    /// The request could not be serviced: unknown action name, malformed
    /// argument JSON, or a missing required argument. Input errors are
    /// excluded from the batch submitted to the run.
    InputError,
}

impl ActionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success(output.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Trait for actions the assistant can request
#[async_trait]
pub trait Action: Send + Sync {
    /// Action name as it appears in tool calls
    fn name(&self) -> &str;

    /// Execute with the parsed argument bundle
    async fn run(&self, arguments: &Value) -> ActionOutcome;
}

/// Collection of actions available to runs
pub struct ActionRegistry {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create the standard registry: order-status lookup and human-handoff
    /// contact capture.
    pub fn standard(db: Database) -> Self {
        Self {
            actions: vec![
                Arc::new(OrderStatusAction::new(db.clone())),
                Arc::new(HumanHandoffAction::new(db)),
            ],
        }
    }

    /// Dispatch a single action request. `raw_arguments` is the JSON text
    /// exactly as the run supplied it; anything unparseable degrades to
    /// `InputError` rather than failing the turn.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> ActionOutcome {
        let arguments: Value = match serde_json::from_str(raw_arguments) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(action = %name, error = %e, "Malformed action arguments");
                return ActionOutcome::InputError;
            }
        };

        for action in &self.actions {
            if action.name() == name {
                return action.run(&arguments).await;
            }
        }

        tracing::warn!(action = %name, "Unknown action requested");
        ActionOutcome::InputError
    }
}
