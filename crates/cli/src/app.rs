//! Wiring of the cache, state store and crawler from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};

use pagewarm_client::fetch::canonicalize;
use pagewarm_client::{FetchClient, FetchConfig, SitemapSource};
use pagewarm_core::config::AppConfig;
use pagewarm_core::http::HttpFetcher;
use pagewarm_core::kv::{KvStore, SqliteKv};
use pagewarm_core::schedule::{KvScheduler, Scheduler};
use pagewarm_core::warmup::{Crawler, Feeder};
use pagewarm_core::{CacheLock, Store};

pub struct App {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub scheduler: Arc<dyn Scheduler>,
    pub crawler: Crawler,
}

impl App {
    /// Open the state database and assemble every component.
    ///
    /// Relative paths are resolved against the working directory.
    pub async fn build(mut config: AppConfig) -> Result<Self> {
        config.cache_dir = std::path::absolute(&config.cache_dir)
            .with_context(|| format!("resolving cache_dir {}", config.cache_dir.display()))?;
        config.home_url = canonicalize(&config.home_url).context("invalid home_url")?.to_string();

        let kv: Arc<dyn KvStore> = Arc::new(
            SqliteKv::open(&config.state_db_path)
                .await
                .with_context(|| format!("opening state database {}", config.state_db_path.display()))?,
        );

        let lock = CacheLock::from_mode(config.lock_mode, config.lock_path());
        let store = Arc::new(
            Store::new(&config.cache_dir, kv.clone(), lock)?.with_compression_level(config.compression_level),
        );

        let http: Arc<dyn HttpFetcher> = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config))?);
        let sitemaps = SitemapSource::new(http.clone(), config.sitemap_urls())
            .with_max_depth(config.max_sitemap_depth)
            .with_max_bytes(config.max_bytes);
        let feeder = Arc::new(
            Feeder::new(kv.clone(), config.home_url.clone(), config.variant_names()).with_source(Arc::new(sitemaps)),
        );

        let scheduler: Arc<dyn Scheduler> = Arc::new(KvScheduler::new(kv));
        let crawler = Crawler::new(store.clone(), feeder, http, scheduler.clone())
            .with_variants(&config.variants)
            .with_delay(config.warmup_delay())
            .with_enabled(config.warmup_enabled);

        tracing::debug!(
            cache_dir = %config.cache_dir.display(),
            state_db = %config.state_db_path.display(),
            home_url = %config.home_url,
            "components ready"
        );

        Ok(Self { config, store, scheduler, crawler })
    }
}
