//! Builds the warm-up queue and persists it between runs.
//!
//! The persisted queue is in one of three states:
//!
//! - not built: no usable state stored, the next fetch builds it
//! - pending: items are waiting
//! - exhausted: the cycle finished; fetches return nothing until [`Feeder::reset`]
//!
//! Exhausted is stored explicitly so a crawl never restarts itself mid-cycle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::item::Item;
use super::queue::WarmUpQueue;
use crate::Error;
use crate::kv::KvStore;

const QUEUE_KEY: &str = "warmup_queue";
const FORMAT_VERSION: u32 = 1;

/// Discovers URLs worth warming, such as sitemap entries.
#[async_trait]
pub trait UrlSource: Send + Sync {
    async fn urls(&self) -> Result<Vec<String>, Error>;
}

/// Rewrites the discovered URL list before it is expanded into items.
pub type UrlFilter = Arc<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum QueueStatus {
    Pending,
    Exhausted,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct PersistedQueueV1 {
    version: u32,
    status: QueueStatus,
    waiting: Vec<Item>,
    processed: Vec<Item>,
}

#[derive(Debug, PartialEq, Eq)]
enum QueueState {
    NotBuilt,
    Pending(WarmUpQueue),
    Exhausted(WarmUpQueue),
}

fn decode(raw: &str) -> QueueState {
    let version = match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => envelope.version,
        Err(err) => {
            warn!(error = %err, "discarding undecodable warm-up queue");
            return QueueState::NotBuilt;
        }
    };

    match version {
        1 => match serde_json::from_str::<PersistedQueueV1>(raw) {
            Ok(persisted) => {
                let queue = WarmUpQueue::from_parts(persisted.waiting, persisted.processed);
                match persisted.status {
                    QueueStatus::Pending => QueueState::Pending(queue),
                    QueueStatus::Exhausted => QueueState::Exhausted(queue),
                }
            }
            Err(err) => {
                warn!(error = %err, "discarding undecodable warm-up queue");
                QueueState::NotBuilt
            }
        },
        other => {
            warn!(version = other, "discarding warm-up queue with unknown format version");
            QueueState::NotBuilt
        }
    }
}

fn canonical_home(raw: String) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(err) => {
            warn!(home_url = %raw, error = %err, "home URL is not absolute; queued as given");
            raw
        }
    }
}

fn encode(queue: WarmUpQueue) -> Result<String, Error> {
    let status = if queue.is_empty() { QueueStatus::Exhausted } else { QueueStatus::Pending };
    let (waiting, processed) = queue.into_parts();
    let persisted = PersistedQueueV1 { version: FORMAT_VERSION, status, waiting, processed };
    Ok(serde_json::to_string(&persisted)?)
}

/// Source of warm-up items for the crawler.
pub struct Feeder {
    kv: Arc<dyn KvStore>,
    home_url: String,
    variants: Vec<String>,
    sources: Vec<Arc<dyn UrlSource>>,
    filter: Option<UrlFilter>,
    // serializes read-modify-write of the persisted queue within this process
    state_lock: Mutex<()>,
}

impl Feeder {
    /// Feeder warming `home_url` for each of `variants`.
    ///
    /// An empty variant list means only the default variant. `home_url` is
    /// brought to the serialized form discovered URLs use, so both dedup.
    pub fn new(kv: Arc<dyn KvStore>, home_url: impl Into<String>, variants: Vec<String>) -> Self {
        let variants = if variants.is_empty() { vec![String::new()] } else { variants };
        Self {
            kv,
            home_url: canonical_home(home_url.into()),
            variants,
            sources: Vec::new(),
            filter: None,
            state_lock: Mutex::new(()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn UrlSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_filter(mut self, filter: UrlFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Home URL followed by every discovered URL, deduplicated.
    ///
    /// A source that fails is skipped.
    pub async fn build_initial_list(&self) -> Vec<String> {
        let mut urls = vec![self.home_url.clone()];
        for source in &self.sources {
            match source.urls().await {
                Ok(found) => urls.extend(found),
                Err(err) => warn!(error = %err, "skipping failed URL source"),
            }
        }

        let mut seen = HashSet::new();
        urls.retain(|url| seen.insert(url.clone()));

        match &self.filter {
            Some(filter) => filter(urls),
            None => urls,
        }
    }

    /// Rebuild the queue from scratch and persist it.
    pub async fn requeue(&self) -> Result<WarmUpQueue, Error> {
        let _state = self.state_lock.lock().await;
        self.rebuild().await
    }

    /// Next item to warm, building the queue first if needed.
    ///
    /// Returns `None` once the queue is exhausted.
    pub async fn fetch_next(&self) -> Result<Option<Item>, Error> {
        let _state = self.state_lock.lock().await;
        let mut queue = match self.load().await? {
            QueueState::Exhausted(_) => return Ok(None),
            QueueState::NotBuilt => self.rebuild().await?,
            QueueState::Pending(queue) => queue,
        };

        let item = queue.fetch();
        self.save(queue).await?;
        Ok(item)
    }

    /// Put `item` back so it is warmed next, even in an exhausted cycle.
    pub async fn push(&self, item: &Item) -> Result<(), Error> {
        let _state = self.state_lock.lock().await;
        match self.load().await? {
            // a fresh build will include it anyway
            QueueState::NotBuilt => Ok(()),
            QueueState::Pending(mut queue) | QueueState::Exhausted(mut queue) => {
                queue.push(item);
                self.save(queue).await
            }
        }
    }

    /// Mark `item` as done without warming it.
    pub async fn pull(&self, item: &Item) -> Result<(), Error> {
        let _state = self.state_lock.lock().await;
        match self.load().await? {
            QueueState::NotBuilt => Ok(()),
            QueueState::Pending(mut queue) | QueueState::Exhausted(mut queue) => {
                queue.pull(item);
                self.save(queue).await
            }
        }
    }

    /// Items still waiting, building the queue if needed.
    pub async fn remaining_count(&self) -> Result<usize, Error> {
        let _state = self.state_lock.lock().await;
        match self.load().await? {
            QueueState::NotBuilt => Ok(self.rebuild().await?.waiting_count()),
            QueueState::Pending(queue) => Ok(queue.waiting_count()),
            QueueState::Exhausted(_) => Ok(0),
        }
    }

    /// Forget the persisted queue; the next fetch starts a new cycle.
    pub async fn reset(&self) -> Result<(), Error> {
        let _state = self.state_lock.lock().await;
        self.kv.delete(QUEUE_KEY).await?;
        debug!("warm-up queue reset");
        Ok(())
    }

    async fn rebuild(&self) -> Result<WarmUpQueue, Error> {
        let urls = self.build_initial_list().await;
        let items: Vec<Item> = urls
            .iter()
            .flat_map(|url| self.variants.iter().map(move |variant| Item::new(url.clone(), variant.clone())))
            .collect();

        let queue = WarmUpQueue::new(items);
        info!(urls = urls.len(), items = queue.total_count(), "warm-up queue built");
        self.save(queue.clone()).await?;
        Ok(queue)
    }

    async fn load(&self) -> Result<QueueState, Error> {
        Ok(match self.kv.get(QUEUE_KEY).await? {
            Some(raw) => decode(&raw),
            None => QueueState::NotBuilt,
        })
    }

    async fn save(&self, queue: WarmUpQueue) -> Result<(), Error> {
        let raw = encode(queue)?;
        self.kv.set(QUEUE_KEY, &raw, None).await
    }
}
