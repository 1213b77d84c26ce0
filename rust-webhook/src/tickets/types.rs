//! Support ticket types exchanged with the ticket store.
//!
//! The ticket store owns these entities; this service only reads the
//! responses it gets back. The wire format is camelCase JSON, matching the
//! platform backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a ticket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
}

/// Ticket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Closed,
}

/// One message in a ticket thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub sender_type: SenderType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A support ticket as returned by the ticket store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    pub ticket_id: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub requester_email: String,
    #[serde(default)]
    pub messages: Vec<TicketMessage>,
    pub status: TicketStatus,
}

/// An inbound email reduced to what the ticket store needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender email address
    pub sender: String,
    /// Email subject, used as the title of new tickets
    pub subject: String,
    /// Message text
    pub content: String,
    /// Provider delivery token, usable by the store for deduplication
    pub delivery_token: String,
}
