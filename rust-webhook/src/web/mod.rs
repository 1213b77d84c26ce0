//! Web server module for the inbound support email webhook.
//!
//! This module provides:
//! - Payload extraction from multipart and url-encoded deliveries
//! - HMAC signature verification
//! - The delivery pipeline and its HTTP error mapping

pub mod error;
pub mod form;
pub mod handlers;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::WebhookError;
pub use form::InboundEmailEvent;
pub use handlers::{email_webhook, health, process_delivery, AppState, HealthResponse, WebhookAck};
pub use signature::{sign, verify_signature, verify_signature_at, SignatureError};

/// Path the email provider posts deliveries to.
pub const WEBHOOK_PATH: &str = "/api/email-webhook";

/// Deliveries with attachments exceed axum's 2 MB default.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(email_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
