//! Core types and shared functionality for pagewarm.
//!
//! This crate provides:
//! - Disk-backed full-page cache (path mapping, storage, size tracking, locking)
//! - Warm-up queue, feeder and crawler
//! - Collaborator traits for key-value persistence, HTTP and scheduling
//! - Unified error types and configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod kv;
pub mod schedule;
pub mod warmup;

pub use cache::{CacheLock, EntryInfo, InvalidationScope, PathCodec, Store};
pub use config::AppConfig;
pub use error::Error;
pub use http::{FetchOptions, HttpFetcher, HttpResponse};
pub use kv::{KvStore, MemoryKv, SqliteKv};
pub use schedule::{KvScheduler, Scheduler};
pub use warmup::{Crawler, Feeder, Item, RunReport, UrlSource, WarmUpQueue};
