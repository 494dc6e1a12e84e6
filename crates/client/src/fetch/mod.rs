//! reqwest-backed implementation of the core HTTP collaborator.
//!
//! ### Redirects
//! - Warm-up requests never follow redirects, so a redirect response is
//!   neither cached under the target nor counted as a failure.
//! - Sitemap requests follow up to `max_redirects` hops.
//!
//! ### Limits
//! - Per-request timeout (default: 20s)
//! - Max body bytes (default: 10MB), checked against `Content-Length` and
//!   the bytes actually read.

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header, redirect::Policy};

pub use url::{UrlError, canonicalize, resolve, same_origin};

use pagewarm_core::config::AppConfig;
use pagewarm_core::http::{FetchOptions, HttpFetcher, HttpResponse};
use pagewarm_core::Error;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pagewarm/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects followed when a request allows it (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "pagewarm/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Self::default()
        }
    }
}

/// HTTP client for warm-up and sitemap requests.
pub struct FetchClient {
    direct: Client,
    following: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let direct = build_client(&config, Policy::none())?;
        let following = build_client(&config, Policy::limited(config.max_redirects))?;
        Ok(Self { direct, following, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: usize) -> Error {
        Error::HttpError(format!("{len} bytes exceeds {}", self.config.max_bytes))
    }
}

fn build_client(config: &FetchConfig, policy: Policy) -> Result<Client, Error> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout)
        .redirect(policy)
        .use_rustls_tls()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))
}

fn map_send_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(url.to_string())
    } else {
        Error::HttpError(format!("network error: {err}"))
    }
}

#[async_trait]
impl HttpFetcher for FetchClient {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, Error> {
        let start = Instant::now();
        let target = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let client = if options.follow_redirects { &self.following } else { &self.direct };
        let mut request = client
            .get(target.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
        if let Some(user_agent) = &options.user_agent {
            request = request.header(header::USER_AGENT, user_agent);
        }
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| map_send_error(url, e))?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let bytes = response.bytes().await.map_err(|e| map_send_error(url, e))?;
        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        tracing::debug!(
            url = %target,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(HttpResponse::new(status.as_u16(), bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "pagewarm/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "site-warmer/2".into(), timeout_ms: 1500, max_bytes: 4096, ..AppConfig::default() };
        let config = FetchConfig::from_app_config(&app);
        assert_eq!(config.user_agent, "site-warmer/2");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.max_bytes, 4096);
        assert_eq!(config.max_redirects, 5);
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        assert!(FetchClient::new(FetchConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url_before_network() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let result = client.fetch("ftp://example.com/", &FetchOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
