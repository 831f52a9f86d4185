/**
 * Routes Module
 * API route handlers
 */
use serde::{Deserialize, Serialize};

pub mod account;
pub mod auth;
pub mod blog;
pub mod comments;
pub mod health;
pub mod profile;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
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
