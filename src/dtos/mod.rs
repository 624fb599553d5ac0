pub mod account;
pub mod auth;

use serde::Serialize;
use utoipa::ToSchema;

/// JSON error envelope: a stable machine-readable code, a human-readable
/// message, and optional structured details (policy violations, lock
/// minutes).
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
