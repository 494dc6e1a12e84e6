//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEWARM_*)
//! 2. TOML config file (if PAGEWARM_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// How Store mutations are serialized against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Advisory lock on a file next to the cache root (multi-process safe).
    File,
    /// No locking; only safe with a single worker.
    None,
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

/// A request variant: one more cached representation of every URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Token embedded in cache filenames. Empty for the default variant.
    #[serde(default)]
    pub name: String,

    /// User-Agent sent by the warm-up crawler for this variant.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Extra request headers sent by the warm-up crawler for this variant.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl VariantConfig {
    /// The default (unnamed) variant.
    pub fn default_variant() -> Self {
        Self { name: String::new(), user_agent: None, headers: BTreeMap::new() }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEWARM_*)
/// 2. TOML config file (if PAGEWARM_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of the page cache.
    ///
    /// Set via PAGEWARM_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Path to the SQLite database holding size, queue and schedule state.
    ///
    /// Set via PAGEWARM_STATE_DB_PATH environment variable.
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    /// Locking strategy for cache mutations.
    ///
    /// Set via PAGEWARM_LOCK_MODE environment variable (`file` or `none`).
    #[serde(default = "default_lock_mode")]
    pub lock_mode: LockMode,

    /// Home page of the site; always the first URL warmed.
    ///
    /// Set via PAGEWARM_HOME_URL environment variable.
    #[serde(default = "default_home_url")]
    pub home_url: String,

    /// Sitemap URLs to harvest. Empty means `<home_url>sitemap.xml`.
    #[serde(default)]
    pub sitemaps: Vec<String>,

    /// Request variants every URL is warmed for.
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantConfig>,

    /// Default User-Agent string for HTTP requests.
    ///
    /// Set via PAGEWARM_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via PAGEWARM_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes read per sitemap response.
    ///
    /// Set via PAGEWARM_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Whether a flush schedules a warm-up crawl.
    ///
    /// Set via PAGEWARM_WARMUP_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub warmup_enabled: bool,

    /// Delay between a flush and the first warm-up run, in seconds.
    ///
    /// Set via PAGEWARM_WARMUP_DELAY_SECS environment variable.
    #[serde(default = "default_warmup_delay_secs")]
    pub warmup_delay_secs: u64,

    /// Length of one host scheduler tick, in seconds.
    ///
    /// Set via PAGEWARM_TICK_INTERVAL_SECS environment variable.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// gzip level for the compressed sidecar (0-9).
    ///
    /// Set via PAGEWARM_COMPRESSION_LEVEL environment variable.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// How many levels of nested sitemap indexes are followed.
    #[serde(default = "default_max_sitemap_depth")]
    pub max_sitemap_depth: usize,

    /// Log output format.
    ///
    /// Set via PAGEWARM_LOG_FORMAT environment variable.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./page-cache")
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("./pagewarm-state.sqlite")
}

fn default_lock_mode() -> LockMode {
    LockMode::File
}

fn default_home_url() -> String {
    "http://localhost/".into()
}

fn default_variants() -> Vec<VariantConfig> {
    vec![VariantConfig::default_variant()]
}

fn default_user_agent() -> String {
    "pagewarm/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_true() -> bool {
    true
}

fn default_warmup_delay_secs() -> u64 {
    600
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_compression_level() -> u32 {
    6
}

fn default_max_sitemap_depth() -> usize {
    3
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            state_db_path: default_state_db_path(),
            lock_mode: default_lock_mode(),
            home_url: default_home_url(),
            sitemaps: Vec::new(),
            variants: default_variants(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            warmup_enabled: true,
            warmup_delay_secs: default_warmup_delay_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            compression_level: default_compression_level(),
            max_sitemap_depth: default_max_sitemap_depth(),
            log_format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between a flush and the first warm-up run.
    pub fn warmup_delay(&self) -> Duration {
        Duration::from_secs(self.warmup_delay_secs)
    }

    /// Length of one host scheduler tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Lock file location. Lives beside the cache root so a flush never unlinks it.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.cache_dir.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "page-cache".into());
        name.push(".lock");
        self.cache_dir.with_file_name(name)
    }

    /// Sitemaps to harvest, falling back to `<home_url>sitemap.xml`.
    pub fn sitemap_urls(&self) -> Vec<String> {
        if !self.sitemaps.is_empty() {
            return self.sitemaps.clone();
        }
        let base = self.home_url.trim_end_matches('/');
        vec![format!("{base}/sitemap.xml")]
    }

    /// Variant names in configuration order.
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    /// Look up a variant by name.
    pub fn variant(&self, name: &str) -> Option<&VariantConfig> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PAGEWARM_`
    /// 2. TOML file from `PAGEWARM_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = std::env::var_os("PAGEWARM_CONFIG_FILE").map(PathBuf::from);
        Self::load_from(config_file.as_deref())
    }

    /// Like [`AppConfig::load`], with the TOML file given explicitly.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_path) = config_file {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(
            Env::prefixed("PAGEWARM_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
