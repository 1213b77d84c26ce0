//! Webhook failure taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use super::signature::SignatureError;

/// Everything that can stop a delivery short of an ack.
///
/// Replays are not errors; they are acked like any other delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// Required fields missing or unreadable. Not worth redelivering.
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
    /// Signature did not verify. Not worth redelivering.
    #[error("invalid signature")]
    InvalidSignature,
    /// Timestamp outside the tolerance window. May pass after a clock resync.
    #[error("stale timestamp")]
    StaleTimestamp,
    /// The ticket store failed before mutating anything. Safe to redeliver.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

/// JSON body for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature | WebhookError::StaleTimestamp => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; internal details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            WebhookError::MalformedPayload(_) => "malformed payload",
            WebhookError::InvalidSignature => "invalid signature",
            WebhookError::StaleTimestamp => "stale timestamp",
            WebhookError::PersistenceFailure(_) => "internal error",
        }
    }
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidSignature => WebhookError::InvalidSignature,
            SignatureError::StaleTimestamp => WebhookError::StaleTimestamp,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
