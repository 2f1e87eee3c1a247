use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon lifecycle: startup, reactor and shutdown.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] lanmedia_core::ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] lanmedia_catalog::CatalogError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One of the three socket classes could not be opened.
    #[error("failed to open {what}: {source}")]
    Socket {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// The readiness wait failed while the daemon was not quitting.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("lanmedia is already running (pid {pid}, pid file {path})")]
    AlreadyRunning { pid: u32, path: PathBuf },

    #[error("background rescan failed: {0}")]
    Background(String),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn socket_err(what: impl Into<String>, source: std::io::Error) -> DaemonError {
    DaemonError::Socket {
        what: what.into(),
        source,
    }
}
