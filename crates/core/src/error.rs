//! Unified error types for pagewarm.
//!
//! The boolean-returning Store surface logs these and swallows them; every
//! other layer propagates them with `?`.

use std::path::PathBuf;

use tokio_rusqlite::rusqlite;

/// Unified error types for the page cache and warm-up pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL is missing a scheme or host, or maps outside the cache root.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Path is empty, relative, or cannot be mapped back to a URL.
    #[error("INVALID_PATH: {0}")]
    InvalidPath(String),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Size or enumeration walk started on something that is not a directory.
    #[error("NOT_A_DIRECTORY: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Advisory lock could not be taken or released.
    #[error("LOCK_ERROR: {0}")]
    Lock(String),

    /// Database operation failed.
    #[error("STATE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STATE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Persisted state could not be encoded or decoded.
    #[error("STATE_ERROR: serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request failed before a response arrived.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// HTTP request timed out.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
