//! Error types for lanmedia-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while assembling a [`crate::RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The options file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line in the options file is not of the form `key = value`.
    #[error("{path}:{line}: expected `key = value`")]
    Syntax { path: PathBuf, line: usize },

    /// `a.b.c.d[/bits]` could not be parsed.
    #[error("error parsing address/mask: {0}")]
    InvalidAddress(String),

    /// A media directory entry was not understood.
    #[error("media directory entry not understood: {0}")]
    InvalidMediaDir(String),

    /// A value could not be converted to the type its option expects.
    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },

    /// No listening address was configured and none could be detected.
    #[error("no usable network address found")]
    NoAddress,

    /// No (or a zero) HTTP port was configured.
    #[error("no HTTP port configured; use -p <port> or `port = <port>`")]
    NoPort,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
