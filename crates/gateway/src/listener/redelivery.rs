use courier_core::MessageId;
use std::collections::HashMap;

/// Rollback counts per message id
///
/// An entry is created on the first rollback of a message and removed once
/// the message is committed or dead-lettered.
#[derive(Debug, Default)]
pub struct RedeliveryTracker {
    attempts: HashMap<MessageId, u32>,
}

impl RedeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more rollback for `message_id` and return the new total
    pub fn record_rollback(&mut self, message_id: &str) -> u32 {
        let count = self.attempts.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, message_id: &str) -> u32 {
        self.attempts.get(message_id).copied().unwrap_or(0)
    }

    pub fn clear(&mut self, message_id: &str) {
        self.attempts.remove(message_id);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// True when `attempt` rollbacks go beyond the configured bound
pub fn exceeds(attempt: u32, max_redelivery_count: Option<u32>) -> bool {
    max_redelivery_count.is_some_and(|max| attempt > max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_until_cleared() {
        let mut tracker = RedeliveryTracker::new();
        assert_eq!(tracker.record_rollback("ID:1"), 1);
        assert_eq!(tracker.record_rollback("ID:1"), 2);
        assert_eq!(tracker.record_rollback("ID:2"), 1);
        assert_eq!(tracker.attempts("ID:1"), 2);

        tracker.clear("ID:1");
        assert_eq!(tracker.attempts("ID:1"), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_bound_allows_n_redeliveries() {
        // N = 3: rollbacks 1..=3 redeliver, the 4th goes to the DLQ
        assert!(!exceeds(3, Some(3)));
        assert!(exceeds(4, Some(3)));
        assert!(exceeds(1, Some(0)));
        assert!(!exceeds(u32::MAX, None));
    }
}
