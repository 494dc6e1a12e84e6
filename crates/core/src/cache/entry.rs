//! On-disk entry naming and the listing record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const STEM: &str = "index";
const EXTENSION: &str = "html";
const COMPRESSED_SUFFIX: &str = ".gz";

/// File name of the primary payload for `variant`.
pub fn plain_file_name(variant: &str) -> String {
    if variant.is_empty() { format!("{STEM}.{EXTENSION}") } else { format!("{STEM}-{variant}.{EXTENSION}") }
}

/// File name of the gzip payload for `variant`.
pub fn compressed_file_name(variant: &str) -> String {
    format!("{}{COMPRESSED_SUFFIX}", plain_file_name(variant))
}

/// Both payload paths for `variant` inside `dir`.
pub(crate) fn entry_paths(dir: &Path, variant: &str) -> (PathBuf, PathBuf) {
    (dir.join(plain_file_name(variant)), dir.join(compressed_file_name(variant)))
}

/// One cached URL as seen by a listing walk.
///
/// `size` counts only files directly inside the directory, across all variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    path: PathBuf,
    size: u64,
    url: String,
    timestamp: Option<DateTime<Utc>>,
}

impl EntryInfo {
    pub fn new(path: PathBuf, size: u64, url: String, timestamp: Option<DateTime<Utc>>) -> Self {
        Self { path, size, url, timestamp }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Most recent modification time of the files in the directory.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}
