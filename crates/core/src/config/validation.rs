//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `compression_level` exceeds 9
    /// - `home_url` has no scheme or host
    /// - variant names repeat or contain characters unsafe for filenames
    ///
    /// Returns `ConfigError::Missing` if `cache_dir` or `variants` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_dir".into(),
                hint: "Set PAGEWARM_CACHE_DIR environment variable".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.compression_level > 9 {
            return Err(ConfigError::Invalid {
                field: "compression_level".into(),
                reason: "must be between 0 and 9".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        match url::Url::parse(&self.home_url) {
            Ok(url) if url.has_host() => {}
            Ok(_) => {
                return Err(ConfigError::Invalid { field: "home_url".into(), reason: "must include a host".into() });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "home_url".into(), reason: e.to_string() });
            }
        }

        if self.variants.is_empty() {
            return Err(ConfigError::Missing {
                field: "variants".into(),
                hint: "Configure at least one variant; use name = \"\" for the default".into(),
            });
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !variant.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(ConfigError::Invalid {
                    field: "variants".into(),
                    reason: format!("variant name `{}` may only contain [A-Za-z0-9_-]", variant.name),
                });
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "variants".into(),
                    reason: format!("variant name `{}` is configured twice", variant.name),
                });
            }
        }

        if self.warmup_enabled && self.tick_interval_secs == 0 {
            tracing::warn!("tick_interval_secs is 0; each warm-up run will process a single item per tick");
        }

        Ok(())
    }
}
