use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues increasing tickets so a consumer can drop responses to requests
/// that a newer request has superseded.
#[derive(Clone, Default)]
pub struct RequestSequencer {
    issued: Arc<AtomicU64>,
    latest: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request; every earlier ticket becomes stale.
    pub fn begin(&self) -> Ticket {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.fetch_max(ticket, Ordering::SeqCst);
        Ticket(ticket)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Hands `value` back only when `ticket` is still the newest request.
    pub fn accept<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::debug!(ticket = ticket.0, "discarding superseded response");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_requests_supersede_older_ones() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.begin();
        let second = sequencer.begin();
        assert!(first < second);
        assert_eq!(sequencer.accept(first, "stale"), None);
        assert_eq!(sequencer.accept(second, "fresh"), Some("fresh"));
    }

    #[test]
    fn clones_share_the_sequence() {
        let sequencer = RequestSequencer::new();
        let other = sequencer.clone();
        let ticket = sequencer.begin();
        other.begin();
        assert!(!sequencer.is_current(ticket));
    }
}
