//! Database schema and types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    user_id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Order ids the store recognizes. Lookups outside this range short-circuit
/// to "not found" without touching the database.
pub const SUPPORTED_ORDER_IDS: RangeInclusive<u32> = 100..=200;

/// Fulfillment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Shipped,
    Pending,
    Delivered,
    Processing,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Shipped,
        OrderStatus::Pending,
        OrderStatus::Delivered,
        OrderStatus::Processing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Pending => "Pending",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Processing => "Processing",
        }
    }

    /// Parse a stored status label. Unknown labels map to `None` so a
    /// corrupt row reads as an absent order rather than an error.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured human-handoff contact. Append-only; duplicates permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}
