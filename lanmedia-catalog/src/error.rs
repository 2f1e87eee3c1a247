//! Error types for lanmedia-catalog.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors that can arise from catalog, scan and watch operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog document on disk is not valid JSON for this format.
    #[error("failed to parse catalog at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (write path).
    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another task held the catalog lock for longer than the busy timeout.
    #[error("catalog busy: lock not acquired within {0:?}")]
    Busy(Duration),

    /// The catalog has already been closed.
    #[error("catalog is closed")]
    Closed,

    /// The filesystem watcher could not be created or attached.
    #[error("filesystem watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Convenience constructor for [`CatalogError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.into(),
        source,
    }
}
