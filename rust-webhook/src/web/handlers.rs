//! Webhook endpoint handlers.
//!
//! A delivery moves through received → verified → correlated → persisted →
//! acked. It leaves early as rejected (malformed, bad signature, stale) or
//! failed (ticket store error). Nothing is carried across requests except
//! the replay cache.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Config, SignaturePolicy};
use crate::replay::{Claim, SeenTokenStore};
use crate::tickets::{correlate, InboundMessage, StoreError, TicketStore};
use crate::web::error::WebhookError;
use crate::web::form::{read_event, InboundEmailEvent};
use crate::web::signature::verify_signature;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy: SignaturePolicy,
    pub tickets: Arc<dyn TicketStore>,
    pub seen_tokens: Arc<dyn SeenTokenStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        tickets: Arc<dyn TicketStore>,
        seen_tokens: Arc<dyn SeenTokenStore>,
    ) -> Self {
        let policy = config.signature_policy();
        Self {
            config: Arc::new(config),
            policy,
            tickets,
            seen_tokens,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Inbound Email Webhook
// =============================================================================

/// Successful webhook response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub ticket_id: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl WebhookAck {
    fn persisted(ticket_id: u64) -> Self {
        Self {
            received: true,
            ticket_id: Some(ticket_id),
            duplicate: false,
        }
    }

    fn replayed(ticket_id: Option<u64>) -> Self {
        Self {
            received: true,
            ticket_id,
            duplicate: true,
        }
    }
}

/// Inbound email webhook endpoint.
pub async fn email_webhook(State(state): State<AppState>, request: Request) -> Response {
    let event = match read_event(request).await {
        Ok(event) => event,
        Err(e) => return e.into_response(),
    };

    match process_delivery(&state, event).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Run one delivery through verification, correlation and persistence.
pub async fn process_delivery(
    state: &AppState,
    event: InboundEmailEvent,
) -> Result<WebhookAck, WebhookError> {
    info!(
        recipient = %event.recipient,
        subject = %event.subject,
        body_length = event.body_plain.len(),
        has_signature = !event.signature.is_empty(),
        "email_webhook_received"
    );

    if let Err(e) = event.validate(state.config.support_inbox_domain.as_deref()) {
        warn!(error = %e, "email_webhook_rejected");
        return Err(e);
    }

    if let Err(e) = authenticate(state, &event) {
        warn!(error = %e, sender = %event.sender, "email_webhook_rejected");
        return Err(e);
    }

    // Unsigned deliveries in permissive mode may come without a token
    let token = event.token.trim();
    if !token.is_empty() {
        match state.seen_tokens.mark_seen(token).await {
            Ok(Claim::Fresh) => {}
            Ok(Claim::Replay { ticket_id }) => {
                info!(ticket_id = ?ticket_id, "email_webhook_replay_acked");
                return Ok(WebhookAck::replayed(ticket_id));
            }
            Err(e) => {
                error!(error = %e, "email_webhook_replay_cache_failed");
                return Err(WebhookError::PersistenceFailure(e.to_string()));
            }
        }
    }

    let correlation = correlate(&event.subject);
    info!(
        is_reply = correlation.is_reply,
        ticket_id = ?correlation.ticket_id,
        "email_webhook_correlated"
    );

    let ticket_id = match persist(state, &event, correlation.ticket_id).await {
        Ok(ticket_id) => ticket_id,
        Err(e) => {
            error!(error = %e, "email_webhook_failed");
            if !token.is_empty() {
                if let Err(forget_err) = state.seen_tokens.forget(token).await {
                    warn!(error = %forget_err, "email_webhook_replay_release_failed");
                }
            }
            return Err(WebhookError::PersistenceFailure(e.to_string()));
        }
    };

    if !token.is_empty() {
        if let Err(e) = state.seen_tokens.record_ticket(token, ticket_id).await {
            // The ticket exists; a replay will still be acked, just without its id
            warn!(ticket_id = ticket_id, error = %e, "email_webhook_replay_record_failed");
        }
    }

    info!(ticket_id = ticket_id, "email_webhook_acked");
    Ok(WebhookAck::persisted(ticket_id))
}

/// Apply the configured signature policy to a delivery.
fn authenticate(state: &AppState, event: &InboundEmailEvent) -> Result<(), WebhookError> {
    match &state.policy {
        SignaturePolicy::Verify { signing_key } => {
            verify_signature(
                signing_key,
                &event.timestamp,
                &event.token,
                &event.signature,
                state.config.signature_tolerance_seconds,
            )?;
            info!("email_webhook_verified");
            Ok(())
        }
        SignaturePolicy::RejectUnsigned => {
            warn!("email_webhook_signing_key_missing");
            Err(WebhookError::InvalidSignature)
        }
        SignaturePolicy::AcceptUnsigned => {
            warn!("email_webhook_signature_skipped_permissive_mode");
            Ok(())
        }
    }
}

/// Create a ticket or append to the referenced one, returning its id.
///
/// A reply to a ticket the store does not know opens a new ticket, so the
/// customer's email is never dropped.
async fn persist(
    state: &AppState,
    event: &InboundEmailEvent,
    ticket_id: Option<u64>,
) -> Result<u64, StoreError> {
    // validate() guarantees sender and body are present
    let sender = event.sender_address().unwrap_or_default();
    let mut message = InboundMessage {
        sender,
        subject: event.subject.trim().to_string(),
        content: event.full_text().unwrap_or_default().to_string(),
        delivery_token: event.token.trim().to_string(),
    };

    if let Some(ticket_id) = ticket_id {
        let reply = InboundMessage {
            content: event.reply_text().unwrap_or_default().to_string(),
            ..message.clone()
        };

        match state.tickets.append_message(ticket_id, &reply).await {
            Ok(ticket) => {
                info!(
                    ticket_id = ticket.ticket_id,
                    message_count = ticket.messages.len(),
                    "email_webhook_reply_appended"
                );
                return Ok(ticket.ticket_id);
            }
            Err(StoreError::TicketNotFound(missing)) => {
                warn!(ticket_id = missing, "email_webhook_reply_ticket_missing");
                message.content = reply.content;
            }
            Err(e) => return Err(e),
        }
    }

    let ticket = state.tickets.create_ticket(&message).await?;
    info!(ticket_id = ticket.ticket_id, "email_webhook_ticket_created");
    Ok(ticket.ticket_id)
}
