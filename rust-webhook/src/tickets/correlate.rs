//! Ticket correlation from the email subject line.
//!
//! Outbound support notifications carry `Ticket #<id>` in their subject, so a
//! reply keeps the marker ("Re: DevQuest Support - New Reply to Ticket #123").

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Outcome of correlating a subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    pub is_reply: bool,
    pub ticket_id: Option<u64>,
}

impl Correlation {
    /// The subject carries no usable marker.
    pub const NEW_TICKET: Correlation = Correlation {
        is_reply: false,
        ticket_id: None,
    };

    fn reply(ticket_id: u64) -> Self {
        Self {
            is_reply: true,
            ticket_id: Some(ticket_id),
        }
    }
}

fn ticket_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)ticket[ \t]+#(\d+)").expect("Invalid ticket marker regex"))
}

/// Decide whether a subject continues an existing ticket.
///
/// The leftmost `Ticket #<digits>` marker wins, even inside a longer word.
/// `Ticket` and `#` must be separated by spaces or tabs on the same line. A
/// marker whose id does not fit in a `u64` is ignored and the subject opens a
/// new ticket.
pub fn correlate(subject: &str) -> Correlation {
    let Some(captures) = ticket_marker().captures(subject) else {
        return Correlation::NEW_TICKET;
    };

    match captures[1].parse::<u64>() {
        Ok(ticket_id) => Correlation::reply(ticket_id),
        Err(_) => {
            debug!(marker = &captures[0], "ticket_marker_out_of_range");
            Correlation::NEW_TICKET
        }
    }
}
