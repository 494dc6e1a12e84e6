//! HTTP client collaborator used by the crawler and the sitemap reader.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::Error;
use crate::config::VariantConfig;

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub follow_redirects: bool,
    /// Overrides the client's default user agent when set.
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl FetchOptions {
    /// Options for a warm-up request: redirects off, variant headers on.
    pub fn for_variant(variant: &VariantConfig) -> Self {
        Self { follow_redirects: false, user_agent: variant.user_agent.clone(), headers: variant.headers.clone() }
    }

    pub fn following_redirects() -> Self {
        Self { follow_redirects: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// Issues a single GET.
///
/// Any HTTP status is a successful response; `Err` means no response arrived.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, Error>;
}
