//! Ticket store interface.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{InboundMessage, SupportTicket};

/// Errors a ticket store can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced ticket does not exist.
    #[error("ticket {0} not found")]
    TicketNotFound(u64),
    /// The backend answered with an unexpected status.
    #[error("ticket backend returned status {status}: {body}")]
    Backend { status: u16, body: String },
    /// The backend could not be reached or its response could not be read.
    #[error("ticket backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// Persistence for support tickets, owned by the platform backend.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Open a new ticket whose first message is `message`.
    async fn create_ticket(&self, message: &InboundMessage) -> Result<SupportTicket, StoreError>;

    /// Append `message` as a user reply to an existing ticket.
    async fn append_message(
        &self,
        ticket_id: u64,
        message: &InboundMessage,
    ) -> Result<SupportTicket, StoreError>;
}
