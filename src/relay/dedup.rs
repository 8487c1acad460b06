use std::collections::HashMap;

use indexmap::IndexSet;
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of message ids remembered per source.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Tracks which inbound message ids have already been relayed, per source.
///
/// Each source keeps an insertion-ordered set. Once it grows past `capacity`
/// the oldest ids are evicted, after which they count as new again.
pub struct DeduplicationStore {
    capacity: usize,
    seen: Mutex<HashMap<String, IndexSet<String>>>,
}

impl DeduplicationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically record `(source_id, message_id)`.
    ///
    /// Returns `true` exactly once per key (while it stays within capacity);
    /// every later call for the same key returns `false` and changes nothing.
    pub async fn should_process(&self, source_id: &str, message_id: &str) -> bool {
        let mut seen = self.seen.lock().await;
        let ids = seen.entry(source_id.to_string()).or_default();

        if !ids.insert(message_id.to_string()) {
            return false;
        }

        if ids.len() > self.capacity {
            let excess = ids.len() - self.capacity;
            ids.drain(..excess);
            debug!(
                "Evicted {} dedup entr{} for source {}",
                excess,
                if excess == 1 { "y" } else { "ies" },
                source_id
            );
        }
        true
    }

    /// Number of ids currently remembered for `source_id`.
    #[allow(dead_code)]
    pub async fn len(&self, source_id: &str) -> usize {
        let seen = self.seen.lock().await;
        seen.get(source_id).map_or(0, IndexSet::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DeduplicationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_call_wins() {
        let store = DeduplicationStore::default();
        assert!(store.should_process("group", "m1").await);
        assert!(!store.should_process("group", "m1").await);
        assert!(store.should_process("group", "m2").await);
        assert_eq!(store.len("group").await, 2);
    }

    #[tokio::test]
    async fn test_scoped_per_source() {
        let store = DeduplicationStore::default();
        assert!(store.should_process("group-a", "m1").await);
        assert!(store.should_process("group-b", "m1").await);
        assert!(!store.should_process("group-b", "m1").await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let store = DeduplicationStore::new(3);
        for id in ["m1", "m2", "m3", "m4"] {
            assert!(store.should_process("group", id).await);
        }
        assert_eq!(store.len("group").await, 3);

        // m1 was evicted and is treated as new; m3 and m4 are still remembered
        assert!(!store.should_process("group", "m3").await);
        assert!(!store.should_process("group", "m4").await);
        assert!(store.should_process("group", "m1").await);
        // re-inserting m1 pushed out m2
        assert!(store.should_process("group", "m2").await);
    }

    #[tokio::test]
    async fn test_eviction_does_not_touch_other_sources() {
        let store = DeduplicationStore::new(1);
        assert!(store.should_process("a", "m1").await);
        assert!(store.should_process("b", "m1").await);
        assert!(store.should_process("a", "m2").await);
        assert!(!store.should_process("b", "m1").await);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let store = DeduplicationStore::new(0);
        assert_eq!(store.capacity(), 1);
        assert!(store.should_process("group", "m1").await);
        assert!(!store.should_process("group", "m1").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_check_and_set_yields_single_winner() {
        let store = Arc::new(DeduplicationStore::default());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.should_process("group", "same-id").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
