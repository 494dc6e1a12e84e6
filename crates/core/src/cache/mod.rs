//! Disk-backed full-page cache.
//!
//! Pages are stored as plain files under a cache root, one directory per URL:
//!
//! - [`path`] maps URLs to directories and back
//! - [`store`] writes, reads, deletes and walks entries
//! - [`size`] keeps an advisory aggregate byte count
//! - [`lock`] serializes mutations across worker processes
//! - [`scope`] collapses repeated invalidations within one request

pub mod entry;
pub mod lock;
pub mod path;
pub mod scope;
pub mod size;
pub mod store;

pub use crate::Error;

pub use entry::{EntryInfo, compressed_file_name, plain_file_name};
pub use lock::{CacheLock, LockGuard};
pub use path::{PathCodec, normalize};
pub use scope::InvalidationScope;
pub use size::SizeTracker;
pub use store::Store;
