//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to converse with the assistant. Fields default to empty so a
/// missing field fails validation in the handler (a 400, not a decode
/// rejection), matching the entry contract.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssistantRequest {
    pub message: String,
    /// External user identifier the session is keyed by
    pub id: String,
}

/// Response carrying the assistant's reply text
#[derive(Debug, Serialize)]
pub struct AssistantResponse {
    pub response: String,
}

/// Response for the session reset operation
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
