//! Sitemap harvesting for the warm-up feeder.
//!
//! Understands both documents of the sitemap protocol:
//!
//! - `<urlset>`: page locations (`<url><loc>`)
//! - `<sitemapindex>`: nested sitemaps (`<sitemap><loc>`)
//!
//! Elements are matched by local name, so namespaced documents work too.
//! Gzip-compressed sitemaps (`sitemap.xml.gz`) are inflated transparently.

use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};
use url::Url;

use pagewarm_core::Error;
use pagewarm_core::http::{FetchOptions, HttpFetcher};
use pagewarm_core::warmup::UrlSource;

use crate::fetch::{canonicalize, resolve, same_origin};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected root element <{0}>")]
    UnknownRoot(String),
}

/// Parsed sitemap document. Locations are trimmed, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sitemap {
    /// Page URLs.
    Urls(Vec<String>),
    /// URLs of further sitemaps.
    Index(Vec<String>),
}

/// Extract the `<loc>` values of a sitemap or sitemap index.
pub fn read_urls_from_sitemap(xml: &str) -> Result<Sitemap, SitemapError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let (entry, is_index) = match root.tag_name().name() {
        "urlset" => ("url", false),
        "sitemapindex" => ("sitemap", true),
        other => return Err(SitemapError::UnknownRoot(other.to_string())),
    };

    let locations: Vec<String> = root
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == entry)
        .filter_map(|node| node.children().find(|child| child.is_element() && child.tag_name().name() == "loc"))
        .filter_map(|loc| loc.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();

    Ok(if is_index { Sitemap::Index(locations) } else { Sitemap::Urls(locations) })
}

/// [`UrlSource`] reading page URLs from configured sitemaps.
pub struct SitemapSource {
    http: Arc<dyn HttpFetcher>,
    sitemaps: Vec<String>,
    max_depth: usize,
    max_bytes: usize,
}

impl SitemapSource {
    pub fn new(http: Arc<dyn HttpFetcher>, sitemaps: Vec<String>) -> Self {
        Self { http, sitemaps, max_depth: 3, max_bytes: 10 * 1024 * 1024 }
    }

    /// Largest accepted sitemap after gzip inflation.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Levels of nested sitemap indexes followed below the configured sitemaps.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    async fn download(&self, url: &Url) -> Result<String, Error> {
        let response = self.http.fetch(url.as_str(), &FetchOptions::following_redirects()).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::HttpError(format!("{url}: status {}", response.status)));
        }

        if response.body.starts_with(&GZIP_MAGIC) {
            let mut inflated = String::new();
            GzDecoder::new(response.body.as_slice())
                .take(self.max_bytes as u64 + 1)
                .read_to_string(&mut inflated)
                .map_err(|e| Error::HttpError(format!("{url}: bad gzip body: {e}")))?;
            if inflated.len() > self.max_bytes {
                return Err(Error::HttpError(format!("{url}: inflated sitemap exceeds {} bytes", self.max_bytes)));
            }
            return Ok(inflated);
        }
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }
}

#[async_trait]
impl UrlSource for SitemapSource {
    /// Failed or malformed sitemaps are skipped; locations on another origin
    /// than their sitemap are dropped.
    async fn urls(&self) -> Result<Vec<String>, Error> {
        let mut pending: VecDeque<(Url, usize)> = VecDeque::new();
        for sitemap in &self.sitemaps {
            match canonicalize(sitemap) {
                Ok(url) => pending.push_back((url, 0)),
                Err(err) => warn!(sitemap = %sitemap, error = %err, "skipping invalid sitemap URL"),
            }
        }

        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut pages = Vec::new();

        while let Some((sitemap, depth)) = pending.pop_front() {
            if !visited.insert(sitemap.clone()) {
                continue;
            }

            let body = match self.download(&sitemap).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(sitemap = %sitemap, error = %err, "skipping unavailable sitemap");
                    continue;
                }
            };

            match read_urls_from_sitemap(&body) {
                Ok(Sitemap::Urls(locations)) => {
                    for location in locations {
                        match resolve(&sitemap, &location) {
                            Ok(page) if same_origin(&sitemap, &page) => {
                                let page = page.to_string();
                                if seen.insert(page.clone()) {
                                    pages.push(page);
                                }
                            }
                            Ok(page) => debug!(sitemap = %sitemap, page = %page, "dropping cross-origin location"),
                            Err(err) => debug!(sitemap = %sitemap, location = %location, error = %err, "dropping location"),
                        }
                    }
                }
                Ok(Sitemap::Index(children)) if depth >= self.max_depth => {
                    warn!(sitemap = %sitemap, children = children.len(), depth, "sitemap index nested too deeply");
                }
                Ok(Sitemap::Index(children)) => {
                    for child in children {
                        match resolve(&sitemap, &child) {
                            Ok(child) => pending.push_back((child, depth + 1)),
                            Err(err) => debug!(sitemap = %sitemap, location = %child, error = %err, "dropping sitemap"),
                        }
                    }
                }
                Err(err) => warn!(sitemap = %sitemap, error = %err, "skipping malformed sitemap"),
            }
        }

        info!(sitemaps = visited.len(), pages = pages.len(), "sitemaps harvested");
        Ok(pages)
    }
}
