//! Inbound message deduplication cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum dedup cache entries
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Inbound message deduplication cache
///
/// Webhook providers redeliver events when a response is slow or lost, so the
/// same message id can arrive more than once. First sight records the id;
/// repeats within the TTL are reported as duplicates. A hard cap on entries
/// keeps memory bounded for long-running processes.
#[derive(Debug)]
pub struct MessageDedup {
    seen: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEDUP_TTL_SECS),
            DEDUP_MAX_ENTRIES,
        )
    }
}

impl MessageDedup {
    /// Create a cache with the given TTL and entry cap
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Check whether the given message id was seen within the TTL
    ///
    /// Returns `true` for a duplicate. Returns `false` on first sight and
    /// records the id.
    pub fn is_duplicate(&mut self, message_id: &str) -> bool {
        let now = Instant::now();

        // Evict expired entries once the cache fills up
        if self.seen.len() >= self.max_entries {
            self.seen.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        // Still full: drop the oldest entry to make room
        if self.seen.len() >= self.max_entries {
            if let Some(oldest) = self
                .seen
                .iter()
                .min_by_key(|(_, ts)| *ts)
                .map(|(id, _)| id.clone())
            {
                self.seen.remove(&oldest);
            }
        }

        if let Some(ts) = self.seen.get(message_id) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }

        self.seen.insert(message_id.to_string(), now);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_is_not_duplicate() {
        let mut dedup = MessageDedup::default();
        assert!(!dedup.is_duplicate("wamid.1"));
        assert!(dedup.is_duplicate("wamid.1"));
    }

    #[test]
    fn test_distinct_ids_are_independent() {
        let mut dedup = MessageDedup::default();
        assert!(!dedup.is_duplicate("wamid.1"));
        assert!(!dedup.is_duplicate("wamid.2"));
    }

    #[test]
    fn test_expired_entry_is_seen_again() {
        let mut dedup = MessageDedup::new(Duration::from_secs(0), 16);
        assert!(!dedup.is_duplicate("wamid.1"));
        // Zero TTL: the recorded entry is already stale
        assert!(!dedup.is_duplicate("wamid.1"));
    }

    #[test]
    fn test_entry_cap_evicts_oldest() {
        let mut dedup = MessageDedup::new(Duration::from_secs(300), 2);
        assert!(!dedup.is_duplicate("a"));
        assert!(!dedup.is_duplicate("b"));
        // Inserting a third entry pushes out the oldest
        assert!(!dedup.is_duplicate("c"));
        assert!(!dedup.is_duplicate("a"));
    }
}
