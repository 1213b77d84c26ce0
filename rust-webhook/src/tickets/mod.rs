//! Support ticket module.
//!
//! This module provides:
//! - Ticket types shared with the platform backend
//! - Subject-line correlation of replies to existing tickets
//! - The `TicketStore` interface and its in-memory and HTTP implementations

pub mod correlate;
pub mod http;
pub mod memory;
pub mod store;
pub mod types;

pub use correlate::{correlate, Correlation};
pub use http::HttpTicketStore;
pub use memory::MemoryTicketStore;
pub use store::{StoreError, TicketStore};
pub use types::{InboundMessage, SenderType, SupportTicket, TicketMessage, TicketStatus};
