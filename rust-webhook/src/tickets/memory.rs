//! In-process ticket store used for local development and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::{Entry, VacantEntry};
use dashmap::DashMap;
use tracing::info;

use super::store::{StoreError, TicketStore};
use super::types::{InboundMessage, SenderType, SupportTicket, TicketMessage, TicketStatus};

/// Ticket store backed by a concurrent map.
///
/// Appends to one ticket are serialised by the map's per-entry lock. A
/// delivery token is claimed before any mutation, so concurrent calls with
/// the same token persist once and the rest return the stored ticket.
#[derive(Clone, Default)]
pub struct MemoryTicketStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tickets: DashMap<u64, SupportTicket>,
    deliveries: DashMap<String, u64>,
    last_id: AtomicU64,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ticket as-is, e.g. one created through the dashboard.
    pub fn insert(&self, ticket: SupportTicket) {
        self.inner
            .last_id
            .fetch_max(ticket.ticket_id, Ordering::SeqCst);
        self.inner.tickets.insert(ticket.ticket_id, ticket);
    }

    pub fn get(&self, ticket_id: u64) -> Option<SupportTicket> {
        self.inner.tickets.get(&ticket_id).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tickets.is_empty()
    }

    /// Lock the delivery slot for `token` until the caller records a ticket.
    ///
    /// Lock order is deliveries then tickets in every path.
    fn claim_delivery(&self, token: &str) -> DeliverySlot<'_> {
        if token.is_empty() {
            return DeliverySlot::Untracked;
        }
        match self.inner.deliveries.entry(token.to_string()) {
            Entry::Occupied(seen) => match self.get(*seen.get()) {
                Some(ticket) => DeliverySlot::Delivered(ticket),
                None => DeliverySlot::Untracked,
            },
            Entry::Vacant(slot) => DeliverySlot::Fresh(slot),
        }
    }

    fn next_id(&self) -> Result<u64, StoreError> {
        self.inner
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| StoreError::Other("ticket id space exhausted".to_string()))
    }
}

enum DeliverySlot<'a> {
    /// No token to dedupe on
    Untracked,
    /// The token already produced this ticket
    Delivered(SupportTicket),
    /// First sighting; the slot stays locked until recorded or dropped
    Fresh(VacantEntry<'a, String, u64>),
}

impl DeliverySlot<'_> {
    fn record(self, ticket_id: u64) {
        if let DeliverySlot::Fresh(slot) = self {
            slot.insert(ticket_id);
        }
    }
}

fn user_message(content: &str) -> TicketMessage {
    TicketMessage {
        sender_type: SenderType::User,
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create_ticket(&self, message: &InboundMessage) -> Result<SupportTicket, StoreError> {
        let slot = match self.claim_delivery(&message.delivery_token) {
            DeliverySlot::Delivered(existing) => return Ok(existing),
            slot => slot,
        };

        let ticket_id = self.next_id()?;
        let ticket = SupportTicket {
            ticket_id,
            subject: message.subject.clone(),
            requester_email: message.sender.clone(),
            messages: vec![user_message(&message.content)],
            status: TicketStatus::Open,
        };

        self.inner.tickets.insert(ticket_id, ticket.clone());
        slot.record(ticket_id);

        info!(ticket_id = ticket_id, sender = %message.sender, "memory_ticket_created");
        Ok(ticket)
    }

    async fn append_message(
        &self,
        ticket_id: u64,
        message: &InboundMessage,
    ) -> Result<SupportTicket, StoreError> {
        let slot = match self.claim_delivery(&message.delivery_token) {
            DeliverySlot::Delivered(existing) => return Ok(existing),
            slot => slot,
        };

        let mut ticket = self
            .inner
            .tickets
            .get_mut(&ticket_id)
            .ok_or(StoreError::TicketNotFound(ticket_id))?;

        ticket.messages.push(user_message(&message.content));
        // A customer reply puts the ticket back in the support queue
        ticket.status = TicketStatus::Open;
        let snapshot = ticket.clone();
        drop(ticket);

        slot.record(ticket_id);

        info!(
            ticket_id = ticket_id,
            message_count = snapshot.messages.len(),
            "memory_ticket_message_appended"
        );
        Ok(snapshot)
    }
}
