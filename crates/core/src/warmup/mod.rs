//! Proactive re-warming of the cache after invalidation.
//!
//! The [`Feeder`] turns the home page and discovered URLs into a persisted
//! [`WarmUpQueue`] of [`Item`]s; the [`Crawler`] drains it under a time budget.

pub mod crawler;
pub mod feeder;
pub mod item;
pub mod queue;

pub use crawler::{Crawler, CrawlerState, DEFAULT_WARMUP_DELAY, RunReport, StopReason, WARMUP_JOB};
pub use feeder::{Feeder, UrlFilter, UrlSource};
pub use item::Item;
pub use queue::WarmUpQueue;
