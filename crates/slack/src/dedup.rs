use std::time::{Duration, Instant};

use mission_control_core::ExpiringMap;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Drops Slack retries and double deliveries of the same event.
///
/// Keys are `{channel}:{event_ts}`. Check-and-insert is a single locked
/// operation, so two concurrent deliveries cannot both be accepted.
#[derive(Debug)]
pub struct EventDeduplicator {
    seen: ExpiringMap<String, ()>,
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl EventDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self { seen: ExpiringMap::new(window) }
    }

    pub fn key(channel: &str, event_ts: &str) -> String {
        format!("{channel}:{event_ts}")
    }

    /// Returns `true` the first time a key is offered within the window.
    pub fn first_delivery(&self, channel: &str, event_ts: &str) -> bool {
        self.seen.insert_if_absent(Self::key(channel, event_ts), ())
    }

    pub fn first_delivery_at(&self, channel: &str, event_ts: &str, now: Instant) -> bool {
        self.seen.insert_if_absent_at(Self::key(channel, event_ts), (), now)
    }

    /// Drops expired keys; driven by the server's sweeper task.
    pub fn sweep(&self) -> usize {
        self.seen.sweep()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::EventDeduplicator;

    #[test]
    fn duplicates_inside_the_window_are_dropped() {
        let dedup = EventDeduplicator::default();
        let start = Instant::now();

        assert!(dedup.first_delivery_at("C1", "1714557600.000100", start));
        assert!(!dedup.first_delivery_at("C1", "1714557600.000100", start + Duration::from_secs(299)));
        assert!(dedup.first_delivery_at("C2", "1714557600.000100", start));
    }

    #[test]
    fn keys_are_accepted_again_after_the_window() {
        let dedup = EventDeduplicator::new(Duration::from_secs(300));
        let start = Instant::now();

        assert!(dedup.first_delivery_at("C1", "1.0", start));
        assert!(dedup.first_delivery_at("C1", "1.0", start + Duration::from_secs(301)));
    }

    #[test]
    fn concurrent_deliveries_accept_exactly_one() {
        let dedup = Arc::new(EventDeduplicator::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.first_delivery("C1", "42.0"))
            })
            .collect();

        let accepted = handles.into_iter().filter_map(|handle| handle.join().ok()).filter(|first| *first).count();
        assert_eq!(accepted, 1);
        assert_eq!(dedup.len(), 1);
    }
}
