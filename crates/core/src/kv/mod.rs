//! Key-value persistence for small shared scalars.
//!
//! The cache size, the serialized warm-up queue and scheduling metadata all
//! live behind [`KvStore`]. Two backends are provided:
//!
//! - [`MemoryKv`]: process-local, for single-worker setups and tests
//! - [`SqliteKv`]: a shared SQLite file, visible to every worker process

pub mod migrations;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;

pub use sqlite::SqliteKv;

/// TTL-capable transient store.
///
/// Values are opaque strings; callers encode structured data themselves.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write a value, replacing any previous one. `None` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error>;

    /// Remove a value. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-memory [`KvStore`].
///
/// Uses a simple HashMap with tokio RwLock for concurrent access.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|entry| !entry.is_expired()).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
        // a TTL past what Instant can represent never expires
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), MemoryEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let kv = MemoryKv::new();
        assert!(kv.get("size").await.unwrap().is_none());

        kv.set("size", "42", None).await.unwrap();
        assert_eq!(kv.get("size").await.unwrap().as_deref(), Some("42"));

        kv.set("size", "43", None).await.unwrap();
        assert_eq!(kv.get("size").await.unwrap().as_deref(), Some("43"));

        kv.delete("size").await.unwrap();
        assert!(kv.get("size").await.unwrap().is_none());
        kv.delete("size").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("short", "1", Some(Duration::from_millis(20))).await.unwrap();
        kv.set("long", "2", Some(Duration::from_secs(3600))).await.unwrap();
        kv.set("forever", "3", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(kv.get("short").await.unwrap().is_none());
        assert_eq!(kv.get("long").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.purge_expired().await, 1);
        assert_eq!(kv.get("forever").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_memory_huge_ttl_never_expires() {
        let kv = MemoryKv::new();
        kv.set("pinned", "1", Some(Duration::MAX)).await.unwrap();
        assert_eq!(kv.get("pinned").await.unwrap().as_deref(), Some("1"));
        assert_eq!(kv.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_memory_clones_share_state() {
        let kv = MemoryKv::new();
        let other = kv.clone();
        kv.set("queue", "[]", None).await.unwrap();
        assert_eq!(other.get("queue").await.unwrap().as_deref(), Some("[]"));
    }
}
