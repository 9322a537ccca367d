use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status discriminator carried by every service response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// A failure reported by a remote service, either through its status
/// discriminator or through a non-success HTTP status without a usable body.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceFailure {
    pub http_status: Option<u16>,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(http_status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            http_status,
            message: message.into(),
        }
    }

    /// Prefers the service-supplied message; falls back to a generic one.
    pub fn from_body(http_status: Option<u16>, message: Option<String>, fallback: &str) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        Self::new(http_status, message)
    }
}
