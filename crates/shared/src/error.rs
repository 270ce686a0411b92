//! Shared error types and helpers for reading the API's error bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Detailed error envelope used by the auth endpoints:
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// The API emits two error shapes: a bare string (`{"error": "not checked in"}`)
/// and a structured [`ErrorDetail`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ErrorPayload {
    Message(String),
    Detail(ErrorDetail),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

/// Attempt to parse an API error body into a user-facing message.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    let message = match parsed.error {
        ErrorPayload::Message(message) => message,
        ErrorPayload::Detail(detail) => {
            if detail.message.trim().is_empty() {
                detail.code
            } else {
                detail.message
            }
        }
    };
    if message.trim().is_empty() {
        None
    } else {
        Some(message)
    }
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human-readable message, preferring the server's own error text.
    pub fn message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => {
                try_error_message(body).unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }
}

/// A presence stream frame that could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed presence frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
