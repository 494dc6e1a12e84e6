//! Per-request memo of invalidations already performed.

use std::collections::HashMap;

use super::store::Store;

/// Created once per request by the front end and dropped with it.
///
/// A request that triggers several invalidation hooks flushes the cache at
/// most once and deletes each URL at most once.
#[derive(Debug, Default)]
pub struct InvalidationScope {
    flushed: Option<bool>,
    deleted: HashMap<String, bool>,
}

impl InvalidationScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush the store unless this scope already did; repeats report the first result.
    pub async fn flush(&mut self, store: &Store, full_wipe: bool) -> bool {
        if let Some(result) = self.flushed {
            return result;
        }
        let result = store.flush(full_wipe).await;
        self.flushed = Some(result);
        result
    }

    /// Delete `url` unless this scope already did, or already flushed everything.
    pub async fn delete(&mut self, store: &Store, url: &str) -> bool {
        if self.flushed == Some(true) {
            return true;
        }
        if let Some(&result) = self.deleted.get(url) {
            return result;
        }
        let result = store.delete(url).await;
        self.deleted.insert(url.to_string(), result);
        result
    }

    pub fn has_flushed(&self) -> bool {
        self.flushed.is_some()
    }
}
