//! Tracing subscriber setup.
//!
//! Debug mode logs at `debug` to stderr. Otherwise the daemon logs at `info`
//! to `<log_dir>/lanmedia.log`, rotated first. `RUST_LOG` overrides either
//! default level.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{io_err, DaemonError};

pub fn init_tracing(debug: bool, log_dir: &Path) -> Result<(), DaemonError> {
    if debug {
        init_stderr_tracing("debug");
        return Ok(());
    }

    std::fs::create_dir_all(log_dir).map_err(|e| io_err(log_dir, e))?;
    crate::log_rotation::rotate_daemon_log(log_dir);
    let path = crate::paths::log_path(log_dir);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    let _ = fmt()
        .with_env_filter(env_filter("info"))
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/// Log to stderr, for foreground helpers such as the rescan child.
pub fn init_stderr_tracing(default_level: &str) {
    let _ = fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
