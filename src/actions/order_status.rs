//! Order-status lookup action

use super::{Action, ActionOutcome};
use crate::db::Database;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Fixed output for ids that are absent, malformed, or out of range.
/// Absence is a normal result and IS submitted back to the run, so the
/// assistant can tell the customer their id was invalid.
const NOT_FOUND: &str = "Order ID not found";

/// Looks up an order's fulfillment status
pub struct OrderStatusAction {
    db: Database,
}

impl OrderStatusAction {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Debug, Deserialize)]
struct OrderStatusInput {
    order_id: OrderIdArg,
}

/// The provisioned schema declares `order_id` as a string, but models also
/// emit bare numbers; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderIdArg {
    Number(u32),
    Text(String),
}

impl OrderIdArg {
    fn parse(&self) -> Option<u32> {
        match self {
            OrderIdArg::Number(n) => Some(*n),
            OrderIdArg::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[async_trait]
impl Action for OrderStatusAction {
    fn name(&self) -> &str {
        "get_order_status"
    }

    async fn run(&self, arguments: &Value) -> ActionOutcome {
        let input: OrderStatusInput = match serde_json::from_value(arguments.clone()) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid order-status arguments");
                return ActionOutcome::InputError;
            }
        };

        // A present-but-unparseable id is a customer mistake, not a protocol
        // error; it reads as "not found" like any other bad id.
        let Some(order_id) = input.order_id.parse() else {
            return ActionOutcome::success(NOT_FOUND);
        };

        match self.db.order_status(order_id) {
            Ok(Some(status)) => ActionOutcome::success(status.as_str()),
            Ok(None) => ActionOutcome::success(NOT_FOUND),
            Err(e) => {
                tracing::error!(order_id, error = %e, "Order lookup failed");
                ActionOutcome::InputError
            }
        }
    }
}
