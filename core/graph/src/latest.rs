use std::sync::atomic::{AtomicU64, Ordering};

/// Guard against applying stale query responses.
///
/// Each re-query takes a ticket; by the time a response arrives, only the
/// ticket from the newest query is still accepted. A search that was
/// superseded while in flight is discarded instead of overwriting fresher
/// results.
#[derive(Debug, Default)]
pub struct LatestOnly {
    generation: AtomicU64,
}

/// Handle identifying one issued query. Obtained from [`LatestOnly::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl LatestOnly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new query, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True only for the ticket of the most recent `begin` call.
    pub fn accept(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_query_is_accepted() {
        let guard = LatestOnly::new();
        let ticket = guard.begin();
        assert!(guard.accept(ticket));
    }

    #[test]
    fn test_superseded_query_is_discarded() {
        let guard = LatestOnly::new();
        let first = guard.begin();
        let second = guard.begin();

        // The slow first response arrives after the second query started.
        assert!(!guard.accept(first));
        assert!(guard.accept(second));
    }

    #[test]
    fn test_acceptance_is_repeatable_until_superseded() {
        let guard = LatestOnly::new();
        let ticket = guard.begin();
        assert!(guard.accept(ticket));
        assert!(guard.accept(ticket));

        guard.begin();
        assert!(!guard.accept(ticket));
    }
}
