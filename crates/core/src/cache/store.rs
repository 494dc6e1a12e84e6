//! Disk layout of the page cache.
//!
//! Every cached URL owns a directory resolved by [`PathCodec`]. Inside it each
//! request variant has a primary payload and a gzip sidecar. Mutations hold
//! the [`CacheLock`]; reads do not.
//!
//! The public surface never returns errors: failures are logged and reported
//! as `false`/`None`, meaning "state may be inconsistent, retry later".

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::fs;
use tracing::{debug, info, warn};

use super::entry::{EntryInfo, entry_paths, plain_file_name};
use super::lock::CacheLock;
use super::path::PathCodec;
use super::size::SizeTracker;
use crate::Error;
use crate::kv::KvStore;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Files found directly inside one directory of the tree.
struct DirSummary {
    path: PathBuf,
    own_size: u64,
    modified: Option<SystemTime>,
}

/// Full-page cache rooted at one directory.
pub struct Store {
    codec: PathCodec,
    size: SizeTracker,
    lock: CacheLock,
    compression: Compression,
}

impl Store {
    /// Create a store over an absolute cache root.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if `root` is not absolute.
    pub fn new(root: impl AsRef<Path>, kv: Arc<dyn KvStore>, lock: CacheLock) -> Result<Self, Error> {
        Ok(Self {
            codec: PathCodec::new(root)?,
            size: SizeTracker::new(kv),
            lock,
            compression: Compression::default(),
        })
    }

    /// gzip level (0-9) for the compressed sidecar.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    pub fn root(&self) -> &Path {
        self.codec.root()
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn lock(&self) -> &CacheLock {
        &self.lock
    }

    pub fn size_tracker(&self) -> &SizeTracker {
        &self.size
    }

    /// Store `payload` for `url` and `variant`, plus its gzip sidecar.
    ///
    /// Returns the bytes written across both files. A failed compression is
    /// skipped; the plain payload still counts as a successful write.
    pub async fn write(&self, url: &str, payload: &[u8], variant: &str) -> Option<u64> {
        match self.try_write(url, payload, variant).await {
            Ok(bytes) => {
                debug!(url = %url, variant = %variant, bytes, "cache entry written");
                Some(bytes)
            }
            Err(err) => {
                warn!(url = %url, variant = %variant, error = %err, "cache write failed");
                None
            }
        }
    }

    /// Cached bytes for `url` and `variant`, plain or gzip.
    pub async fn read(&self, url: &str, variant: &str, compressed: bool) -> Option<Vec<u8>> {
        let (plain, gz) = match self.resolve(url, variant) {
            Ok(dir) => entry_paths(&dir, variant),
            Err(err) => {
                debug!(url = %url, error = %err, "cache read rejected");
                return None;
            }
        };
        let path = if compressed { gz } else { plain };

        match fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache read failed");
                None
            }
        }
    }

    /// Whether a primary payload exists for `url` and `variant`.
    pub async fn has(&self, url: &str, variant: &str) -> bool {
        let dir = match self.resolve(url, variant) {
            Ok(dir) => dir,
            Err(err) => {
                debug!(url = %url, error = %err, "cache lookup rejected");
                return false;
            }
        };
        fs::try_exists(dir.join(plain_file_name(variant))).await.unwrap_or(false)
    }

    /// Remove every variant file for `url`.
    ///
    /// The directory itself survives when it still holds nested pages.
    /// Deleting an entry that does not exist succeeds.
    pub async fn delete(&self, url: &str) -> bool {
        match self.try_delete(url).await {
            Ok(removed) => {
                debug!(url = %url, removed, "cache entry deleted");
                true
            }
            Err(err) => {
                warn!(url = %url, error = %err, "cache delete failed");
                false
            }
        }
    }

    /// Remove the whole cache tree.
    ///
    /// The size aggregate becomes 0, or unknown with `full_wipe` when no
    /// writes are expected until the cache is set up again.
    pub async fn flush(&self, full_wipe: bool) -> bool {
        match self.try_flush(full_wipe).await {
            Ok(()) => {
                info!(root = %self.root().display(), full_wipe, "cache flushed");
                true
            }
            Err(err) => {
                warn!(root = %self.root().display(), error = %err, "cache flush failed");
                false
            }
        }
    }

    /// Every directory that directly holds cached files, with its URL.
    ///
    /// Directories whose URL cannot be reconstructed are skipped.
    pub async fn inspect(&self) -> Vec<EntryInfo> {
        let dirs = match self.walk().await {
            Ok(dirs) => dirs,
            Err(err) => {
                warn!(root = %self.root().display(), error = %err, "cache inspection failed");
                return Vec::new();
            }
        };

        let mut entries: Vec<EntryInfo> = dirs
            .into_iter()
            .filter(|dir| dir.own_size > 0)
            .filter_map(|dir| match self.codec.decode(&dir.path) {
                Ok(url) => {
                    let timestamp = dir.modified.map(DateTime::<Utc>::from);
                    Some(EntryInfo::new(dir.path, dir.own_size, url, timestamp))
                }
                Err(err) => {
                    debug!(path = %dir.path.display(), error = %err, "skipping unmappable cache directory");
                    None
                }
            })
            .collect();

        entries.sort_by(|a, b| a.path().cmp(b.path()));
        entries
    }

    /// Aggregate size of the cache in bytes.
    ///
    /// Uses the tracked aggregate when known and `precise` is false; otherwise
    /// walks the tree and refreshes the aggregate.
    pub async fn get_size(&self, precise: bool) -> u64 {
        if !precise && let Some(size) = self.size.get().await {
            return size;
        }

        match self.walk().await {
            Ok(dirs) => {
                let total = dirs.iter().map(|dir| dir.own_size).sum();
                self.size.set(total).await;
                total
            }
            Err(err) => {
                warn!(root = %self.root().display(), error = %err, "cache size walk failed");
                self.size.get().await.unwrap_or(0)
            }
        }
    }

    fn resolve(&self, url: &str, variant: &str) -> Result<PathBuf, Error> {
        if !is_valid_variant(variant) {
            return Err(Error::InvalidPath(format!("variant `{variant}` is not a safe file name token")));
        }
        self.codec.encode(url)
    }

    async fn try_write(&self, url: &str, payload: &[u8], variant: &str) -> Result<u64, Error> {
        let dir = self.resolve(url, variant)?;
        let _guard = self.lock.acquire().await?;

        fs::create_dir_all(&dir).await.map_err(|e| Error::io(&dir, e))?;
        let (plain, gz) = entry_paths(&dir, variant);
        let previous = file_len(&plain).await + file_len(&gz).await;

        write_atomic(&plain, payload).await?;
        let mut written = payload.len() as u64;

        let compressed = self.compress(payload);
        match compressed {
            Ok(bytes) => match write_atomic(&gz, &bytes).await {
                Ok(()) => written += bytes.len() as u64,
                Err(err) => {
                    debug!(url = %url, error = %err, "skipping compressed payload");
                    remove_if_exists(&gz).await;
                }
            },
            Err(err) => {
                debug!(url = %url, error = %err, "skipping compressed payload");
                remove_if_exists(&gz).await;
            }
        }

        self.size.adjust(previous, written).await;
        Ok(written)
    }

    async fn try_delete(&self, url: &str) -> Result<u64, Error> {
        let dir = self.codec.encode(url)?;
        let _guard = self.lock.acquire().await?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(Error::io(&dir, err)),
        };

        let mut removed = 0u64;
        let mut nested = false;
        let mut failure = None;

        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&dir, e))? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    failure.get_or_insert(Error::io(&path, err));
                    continue;
                }
            };
            if metadata.is_dir() {
                nested = true;
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += metadata.len(),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    failure.get_or_insert(Error::io(&path, err));
                }
            }
        }

        self.size.decrement(removed).await;

        if let Some(err) = failure {
            return Err(err);
        }
        if !nested && let Err(err) = fs::remove_dir(&dir).await {
            debug!(path = %dir.display(), error = %err, "leaving cache directory in place");
        }
        Ok(removed)
    }

    async fn try_flush(&self, full_wipe: bool) -> Result<(), Error> {
        let _guard = self.lock.acquire().await?;
        let root = self.root().to_path_buf();

        let result = match fs::remove_dir_all(&root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(&root, err)),
        };

        match (&result, full_wipe) {
            (Ok(()), false) => self.size.reset().await,
            _ => self.size.clear().await,
        }
        result
    }

    fn compress(&self, payload: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), self.compression);
        encoder.write_all(payload)?;
        encoder.finish()
    }

    /// Visit every directory under the root once.
    ///
    /// Unreadable subdirectories are logged and skipped.
    async fn walk(&self) -> Result<Vec<DirSummary>, Error> {
        let root = self.root().to_path_buf();
        match fs::metadata(&root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(Error::NotADirectory(root)),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io(&root, err)),
        }

        let mut summaries = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            match summarize_dir(&dir, &mut pending).await {
                Ok(summary) => summaries.push(summary),
                Err(err) => warn!(path = %dir.display(), error = %err, "skipping unreadable cache directory"),
            }
        }

        Ok(summaries)
    }
}

async fn summarize_dir(dir: &Path, pending: &mut Vec<PathBuf>) -> Result<DirSummary, Error> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| Error::io(dir, e))?;
    let mut own_size = 0u64;
    let mut modified: Option<SystemTime> = None;

    while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            // raced with a concurrent delete
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(Error::io(entry.path(), err)),
        };
        if metadata.is_dir() {
            pending.push(entry.path());
        } else if metadata.is_file() {
            own_size += metadata.len();
            if let Ok(mtime) = metadata.modified() {
                modified = Some(modified.map_or(mtime, |current| current.max(mtime)));
            }
        }
    }

    Ok(DirSummary { path: dir.to_path_buf(), own_size, modified })
}

fn is_valid_variant(variant: &str) -> bool {
    variant.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn file_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn remove_if_exists(path: &Path) {
    if let Err(err) = fs::remove_file(path).await
        && err.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %err, "failed to remove stale cache file");
    }
}

/// Write through a temp file in the same directory so readers never see a partial payload.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("entry");
    let temp = path.with_file_name(format!(
        ".{name}.tmp-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(err) = fs::write(&temp, contents).await {
        remove_if_exists(&temp).await;
        return Err(Error::io(&temp, err));
    }
    if let Err(err) = fs::rename(&temp, path).await {
        remove_if_exists(&temp).await;
        return Err(Error::io(path, err));
    }
    Ok(())
}
