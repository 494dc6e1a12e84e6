//! Incrementally maintained aggregate cache size.
//!
//! The value is advisory: concurrent writers doing read-modify-write against
//! the shared store can lose updates. Anything that would drive the total
//! negative marks it unknown instead, and the next precise read recomputes it.

use std::sync::Arc;

use tracing::warn;

use crate::kv::KvStore;

const SIZE_KEY: &str = "cache_size";

/// Aggregate byte count persisted in a [`KvStore`].
#[derive(Clone)]
pub struct SizeTracker {
    kv: Arc<dyn KvStore>,
}

impl SizeTracker {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Current aggregate, or `None` when unknown.
    pub async fn get(&self) -> Option<u64> {
        match self.kv.get(SIZE_KEY).await {
            Ok(Some(raw)) => match raw.parse() {
                Ok(size) => Some(size),
                Err(_) => {
                    warn!(value = %raw, "discarding unparsable cache size");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read cache size");
                None
            }
        }
    }

    pub async fn set(&self, bytes: u64) {
        if let Err(err) = self.kv.set(SIZE_KEY, &bytes.to_string(), None).await {
            warn!(error = %err, bytes, "failed to store cache size");
        }
    }

    /// Add `bytes`. An unknown aggregate stays unknown.
    pub async fn increment(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        if let Some(current) = self.get().await {
            self.set(current.saturating_add(bytes)).await;
        }
    }

    /// Subtract `bytes`. Underflow marks the aggregate unknown.
    pub async fn decrement(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let Some(current) = self.get().await else {
            return;
        };
        match current.checked_sub(bytes) {
            Some(remaining) => self.set(remaining).await,
            None => {
                warn!(current, bytes, "cache size underflow; marking unknown");
                self.clear().await;
            }
        }
    }

    /// Apply a signed change from an overwrite.
    pub async fn adjust(&self, old_bytes: u64, new_bytes: u64) {
        if new_bytes >= old_bytes {
            self.increment(new_bytes - old_bytes).await;
        } else {
            self.decrement(old_bytes - new_bytes).await;
        }
    }

    /// Known-empty cache.
    pub async fn reset(&self) {
        self.set(0).await;
    }

    /// Forget the aggregate entirely.
    pub async fn clear(&self) {
        if let Err(err) = self.kv.delete(SIZE_KEY).await {
            warn!(error = %err, "failed to clear cache size");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn tracker() -> SizeTracker {
        SizeTracker::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_unknown_until_set() {
        let size = tracker();
        assert_eq!(size.get().await, None);
        size.increment(10).await;
        assert_eq!(size.get().await, None);
        size.reset().await;
        assert_eq!(size.get().await, Some(0));
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let size = tracker();
        size.set(100).await;
        size.increment(50).await;
        assert_eq!(size.get().await, Some(150));
        size.decrement(30).await;
        assert_eq!(size.get().await, Some(120));
    }

    #[tokio::test]
    async fn test_underflow_marks_unknown() {
        let size = tracker();
        size.set(10).await;
        size.decrement(11).await;
        assert_eq!(size.get().await, None);
    }

    #[tokio::test]
    async fn test_adjust_both_directions() {
        let size = tracker();
        size.set(100).await;
        size.adjust(40, 60).await;
        assert_eq!(size.get().await, Some(120));
        size.adjust(60, 10).await;
        assert_eq!(size.get().await, Some(70));
    }

    #[tokio::test]
    async fn test_garbage_value_reads_unknown() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(SIZE_KEY, "-5", None).await.unwrap();
        let size = SizeTracker::new(kv);
        assert_eq!(size.get().await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let size = tracker();
        size.set(5).await;
        size.clear().await;
        assert_eq!(size.get().await, None);
    }
}
