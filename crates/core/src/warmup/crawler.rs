//! Time-boxed warm-up runs driven by the host's periodic tick.
//!
//! ```text
//! Idle --on_invalidation--> Scheduled --tick--> Running --+--> Idle       (exhausted or failed)
//!                                                         +--> Scheduled  (budget spent)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::feeder::Feeder;
use super::item::Item;
use crate::Error;
use crate::cache::Store;
use crate::config::VariantConfig;
use crate::http::{FetchOptions, HttpFetcher};
use crate::schedule::Scheduler;

/// Scheduler job name of the warm-up crawl.
pub const WARMUP_JOB: &str = "warmup";

/// Delay between an invalidation and the first run.
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlerState {
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every item was handled.
    Exhausted,
    /// A fetch got a 5xx or no response.
    Failed,
    /// Time ran out with items left; the next tick continues.
    BudgetSpent,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Exhausted => "exhausted",
            StopReason::Failed => "failed",
            StopReason::BudgetSpent => "budget_spent",
        };
        f.write_str(s)
    }
}

/// Outcome of one [`Crawler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub stop: StopReason,
    /// Items requested over the network.
    pub fetched: usize,
    /// Items already cached.
    pub skipped: usize,
    /// Items still waiting after the run.
    pub remaining: usize,
}

struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Crawler {
    store: Arc<Store>,
    feeder: Arc<Feeder>,
    http: Arc<dyn HttpFetcher>,
    scheduler: Arc<dyn Scheduler>,
    options: HashMap<String, FetchOptions>,
    delay: Duration,
    enabled: bool,
    running: AtomicBool,
}

impl Crawler {
    pub fn new(
        store: Arc<Store>,
        feeder: Arc<Feeder>,
        http: Arc<dyn HttpFetcher>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            store,
            feeder,
            http,
            scheduler,
            options: HashMap::new(),
            delay: DEFAULT_WARMUP_DELAY,
            enabled: true,
            running: AtomicBool::new(false),
        }
    }

    /// Request options per variant. Unlisted variants get plain requests.
    pub fn with_variants(mut self, variants: &[VariantConfig]) -> Self {
        self.options = variants.iter().map(|v| (v.name.clone(), FetchOptions::for_variant(v))).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// When disabled, invalidations reset the queue without scheduling a run.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// React to a full-cache flush: restart the cycle and schedule one run.
    pub async fn on_invalidation(&self) -> Result<(), Error> {
        self.scheduler.cancel_scheduled(WARMUP_JOB).await?;
        self.feeder.reset().await?;

        if !self.enabled {
            debug!("warm-up disabled; queue reset only");
            return Ok(());
        }

        self.scheduler.schedule_once(self.delay, WARMUP_JOB).await?;
        info!(delay_secs = self.delay.as_secs(), "warm-up scheduled");
        Ok(())
    }

    /// Run only if the warm-up job is due. This is the per-tick entry point.
    pub async fn run_if_due(&self, budget: Option<Duration>) -> Result<Option<RunReport>, Error> {
        if !self.scheduler.take_due(WARMUP_JOB).await? {
            return Ok(None);
        }
        Ok(Some(self.run(budget).await))
    }

    /// Warm items until the queue is empty, a fetch fails, or `budget` is spent.
    ///
    /// At least one item is handled even with a zero budget. `None` means no
    /// time limit.
    pub async fn run(&self, budget: Option<Duration>) -> RunReport {
        self.running.store(true, Ordering::SeqCst);
        let _running = RunningFlag(&self.running);

        let started = Instant::now();
        let mut fetched = 0;
        let mut skipped = 0;

        let stop = loop {
            let item = match self.feeder.fetch_next().await {
                Ok(Some(item)) => item,
                Ok(None) => break StopReason::Exhausted,
                Err(err) => {
                    warn!(error = %err, "warm-up queue unavailable");
                    break StopReason::Failed;
                }
            };

            if self.store.has(item.url(), item.variant()).await {
                debug!(item = %item, "already cached");
                skipped += 1;
            } else if self.warm(&item).await {
                fetched += 1;
            } else {
                // leave it for the next run
                if let Err(err) = self.feeder.push(&item).await {
                    warn!(item = %item, error = %err, "failed to requeue item");
                }
                break StopReason::Failed;
            }

            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                break StopReason::BudgetSpent;
            }
        };

        let remaining = match self.feeder.remaining_count().await {
            Ok(remaining) => Some(remaining),
            Err(err) => {
                warn!(error = %err, "failed to count remaining items");
                None
            }
        };
        // the last item may coincide with the deadline
        let stop = match (stop, remaining) {
            (StopReason::BudgetSpent, Some(0)) => StopReason::Exhausted,
            (stop, _) => stop,
        };
        let remaining = remaining.unwrap_or(0);

        if stop == StopReason::BudgetSpent
            && let Err(err) = self.scheduler.schedule_once(Duration::ZERO, WARMUP_JOB).await
        {
            warn!(error = %err, "failed to reschedule warm-up");
        }

        info!(
            stop = %stop,
            fetched,
            skipped,
            remaining,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warm-up run finished"
        );
        RunReport { stop, fetched, skipped, remaining }
    }

    pub async fn remaining_count(&self) -> Result<usize, Error> {
        self.feeder.remaining_count().await
    }

    pub async fn state(&self) -> Result<CrawlerState, Error> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(CrawlerState::Running);
        }
        Ok(match self.scheduler.next_scheduled(WARMUP_JOB).await? {
            Some(_) => CrawlerState::Scheduled,
            None => CrawlerState::Idle,
        })
    }

    async fn warm(&self, item: &Item) -> bool {
        let options = self.options.get(item.variant()).cloned().unwrap_or_default();
        match self.http.fetch(item.url(), &options).await {
            Ok(response) if response.is_server_error() => {
                warn!(item = %item, status = response.status, "warm-up fetch failed");
                false
            }
            Ok(response) => {
                debug!(item = %item, status = response.status, bytes = response.body.len(), "warmed");
                true
            }
            Err(err) => {
                warn!(item = %item, error = %err, "warm-up fetch failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLock;
    use crate::http::HttpResponse;
    use crate::kv::MemoryKv;
    use crate::schedule::KvScheduler;
    use crate::warmup::UrlSource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const HOME: &str = "https://example.com/";

    #[derive(Default)]
    struct MockHttp {
        statuses: HashMap<String, u16>,
        unreachable: Vec<String>,
        calls: Mutex<Vec<(String, FetchOptions)>>,
        delay: Duration,
    }

    impl MockHttp {
        fn calls(&self) -> Vec<(String, FetchOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpFetcher for MockHttp {
        async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, Error> {
            self.calls.lock().unwrap().push((url.to_string(), options.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.unreachable.iter().any(|u| u == url) {
                return Err(Error::HttpError("connection refused".into()));
            }
            let status = self.statuses.get(url).copied().unwrap_or(200);
            Ok(HttpResponse::new(status, "<html></html>"))
        }
    }

    struct Pages(Vec<String>);

    #[async_trait]
    impl UrlSource for Pages {
        async fn urls(&self) -> Result<Vec<String>, Error> {
            Ok(self.0.clone())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<Store>,
        scheduler: Arc<KvScheduler>,
        http: Arc<MockHttp>,
        crawler: Crawler,
    }

    fn harness(pages: usize, variants: &[VariantConfig], http: MockHttp) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(Store::new(dir.path().join("cache"), kv.clone(), CacheLock::Noop).unwrap());
        let urls = (1..=pages).map(|i| format!("https://example.com/page-{i}")).collect();
        let names = variants.iter().map(|v| v.name.clone()).collect();
        let feeder = Arc::new(Feeder::new(kv.clone(), HOME, names).with_source(Arc::new(Pages(urls))));
        let scheduler = Arc::new(KvScheduler::new(kv));
        let http = Arc::new(http);
        let crawler = Crawler::new(store.clone(), feeder, http.clone(), scheduler.clone()).with_variants(variants);
        Harness { _dir: dir, store, scheduler, http, crawler }
    }

    #[tokio::test]
    async fn test_zero_budget_does_one_step() {
        let h = harness(3, &[], MockHttp::default());

        let report = h.crawler.run(Some(Duration::ZERO)).await;
        assert_eq!(report.stop, StopReason::BudgetSpent);
        assert_eq!(report.fetched + report.skipped, 1);
        assert_eq!(report.remaining, 3);
        assert_eq!(h.http.calls().len(), 1);

        // rescheduled to continue immediately
        assert_eq!(h.crawler.state().await.unwrap(), CrawlerState::Scheduled);
        assert!(h.scheduler.take_due(WARMUP_JOB).await.unwrap());
    }

    #[tokio::test]
    async fn test_budget_spent_on_last_item_is_exhausted() {
        let h = harness(0, &[], MockHttp::default());

        let report = h.crawler.run(Some(Duration::ZERO)).await;
        assert_eq!(report, RunReport { stop: StopReason::Exhausted, fetched: 1, skipped: 0, remaining: 0 });
        assert_eq!(h.crawler.state().await.unwrap(), CrawlerState::Idle);
        assert!(!h.scheduler.take_due(WARMUP_JOB).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_budget_drains_queue() {
        let h = harness(3, &[], MockHttp::default());

        let report = h.crawler.run(None).await;
        assert_eq!(report, RunReport { stop: StopReason::Exhausted, fetched: 4, skipped: 0, remaining: 0 });
        assert_eq!(h.crawler.remaining_count().await.unwrap(), 0);
        assert_eq!(h.crawler.state().await.unwrap(), CrawlerState::Idle);

        // an exhausted cycle does not restart on its own
        let again = h.crawler.run(None).await;
        assert_eq!(again.fetched, 0);
        assert_eq!(h.http.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_cached_items_are_skipped() {
        let h = harness(2, &[], MockHttp::default());
        h.store.write(HOME, b"cached home", "").await.unwrap();

        let report = h.crawler.run(None).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.fetched, 2);
        assert!(h.http.calls().iter().all(|(url, _)| url != HOME));
    }

    #[tokio::test]
    async fn test_server_error_stops_run_without_reschedule() {
        let mut http = MockHttp::default();
        http.statuses.insert("https://example.com/page-1".into(), 503);
        let h = harness(3, &[], http);

        let report = h.crawler.run(None).await;
        assert_eq!(report.stop, StopReason::Failed);
        assert_eq!(report.fetched, 1);
        // failed item stays queued for the next run
        assert_eq!(report.remaining, 3);
        assert_eq!(h.crawler.state().await.unwrap(), CrawlerState::Idle);
        assert_eq!(h.http.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_failures() {
        let mut http = MockHttp::default();
        http.statuses.insert("https://example.com/page-1".into(), 404);
        let h = harness(2, &[], http);

        let report = h.crawler.run(None).await;
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.fetched, 3);
    }

    #[tokio::test]
    async fn test_no_response_stops_run() {
        let http = MockHttp { unreachable: vec![HOME.to_string()], ..MockHttp::default() };
        let h = harness(1, &[], http);

        let report = h.crawler.run(None).await;
        assert_eq!(report, RunReport { stop: StopReason::Failed, fetched: 0, skipped: 0, remaining: 2 });
    }

    #[tokio::test]
    async fn test_requests_use_variant_options_without_redirects() {
        let mut mobile = VariantConfig::default_variant();
        mobile.name = "mobile".into();
        mobile.user_agent = Some("Mobile Safari".into());
        let h = harness(0, &[VariantConfig::default_variant(), mobile], MockHttp::default());

        h.crawler.run(None).await;
        let calls = h.http.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(url, options)| url == HOME && !options.follow_redirects));
        assert_eq!(calls[0].1.user_agent, None);
        assert_eq!(calls[1].1.user_agent.as_deref(), Some("Mobile Safari"));
    }

    #[tokio::test]
    async fn test_budget_stops_between_items() {
        let http = MockHttp { delay: Duration::from_millis(30), ..MockHttp::default() };
        let h = harness(9, &[], http);

        let report = h.crawler.run(Some(Duration::from_millis(50))).await;
        assert_eq!(report.stop, StopReason::BudgetSpent);
        assert!(report.fetched >= 2 && report.fetched < 10);
        assert_eq!(report.remaining, 10 - report.fetched);
    }

    #[tokio::test]
    async fn test_invalidation_schedules_delayed_run() {
        let h = harness(1, &[], MockHttp::default());
        h.crawler.run(None).await;

        h.crawler.on_invalidation().await.unwrap();
        assert_eq!(h.crawler.state().await.unwrap(), CrawlerState::Scheduled);
        let due = h.scheduler.next_scheduled(WARMUP_JOB).await.unwrap().unwrap();
        assert!(due > chrono::Utc::now() + chrono::Duration::seconds(590));

        // not due yet, and the cycle was restarted
        assert_eq!(h.crawler.run_if_due(None).await.unwrap(), None);
        assert_eq!(h.crawler.remaining_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_if_due() {
        let h = harness(1, &[], MockHttp::default());
        let crawler = h.crawler.with_delay(Duration::ZERO);

        crawler.on_invalidation().await.unwrap();
        crawler.on_invalidation().await.unwrap();
        let report = crawler.run_if_due(None).await.unwrap().unwrap();
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(crawler.run_if_due(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_warmup_only_resets() {
        let h = harness(1, &[], MockHttp::default());
        h.crawler.run(None).await;
        let crawler = h.crawler.with_enabled(false);

        crawler.on_invalidation().await.unwrap();
        assert_eq!(crawler.state().await.unwrap(), CrawlerState::Idle);
        assert_eq!(crawler.remaining_count().await.unwrap(), 2);
    }
}
