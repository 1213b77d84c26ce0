//! DevQuest support mail webhook.
//!
//! Receives inbound support emails from the email provider and turns them
//! into support tickets:
//! - `devquest-webhook`: the webhook server
//! - `devquest-webhook-probe`: posts signed test deliveries to a running server
//!
//! ## Flow
//!
//! ```text
//! POST /api/email-webhook → verify signature → claim token → correlate subject
//!                         → TicketStore create/append → {"received": true, "ticketId": ..}
//! ```

pub mod config;
pub mod probe;
pub mod replay;
pub mod telemetry;
pub mod tickets;
pub mod web;

// Re-export commonly used types
pub use config::{Config, SignaturePolicy};
pub use replay::{Claim, MemorySeenTokens, SeenTokenStore};
pub use tickets::{
    correlate, Correlation, HttpTicketStore, InboundMessage, MemoryTicketStore, StoreError,
    SupportTicket, TicketStore,
};
pub use web::{router, AppState, WebhookAck, WebhookError};
