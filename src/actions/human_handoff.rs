//! Human-handoff contact capture action

use super::{Action, ActionOutcome};
use crate::db::{ContactRecord, Database};
use async_trait::async_trait;
use serde_json::Value;

/// Fixed confirmation returned on every successful capture
const CONFIRMATION: &str = "We saved your contact details and will contact you soon.";

/// Captures contact details for customers who want a human representative.
/// Field formats are not validated here; the assistant's argument schema
/// already nudges users toward well-formed values, and a reachable human
/// beats a rejected phone number.
pub struct HumanHandoffAction {
    db: Database,
}

impl HumanHandoffAction {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Action for HumanHandoffAction {
    fn name(&self) -> &str {
        "request_human_representative"
    }

    async fn run(&self, arguments: &Value) -> ActionOutcome {
        let contact: ContactRecord = match serde_json::from_value(arguments.clone()) {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid human-handoff arguments");
                return ActionOutcome::InputError;
            }
        };

        match self.db.append_contact(&contact) {
            Ok(()) => {
                tracing::info!(full_name = %contact.full_name, "Contact captured for human handoff");
                ActionOutcome::success(CONFIRMATION)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to append contact record");
                ActionOutcome::InputError
            }
        }
    }
}
