//! Network-facing collaborators for pagewarm.
//!
//! This crate provides the reqwest-backed HTTP client used for warm-up
//! requests and the sitemap reader that feeds the warm-up queue.

pub mod fetch;
pub mod sitemap;

pub use fetch::{FetchClient, FetchConfig};
pub use sitemap::{Sitemap, SitemapError, SitemapSource, read_urls_from_sitemap};
