//! Failures reported by CLI commands.

/// A command ran but the operation behind it did not succeed.
///
/// Details are already in the log; these carry the one-line summary.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A Store mutation reported failure.
    #[error("CACHE_FAILED: {0}")]
    CacheFailed(String),

    /// A warm-up run stopped on a failed fetch.
    #[error("WARMUP_FAILED: {0}")]
    WarmupFailed(String),
}
