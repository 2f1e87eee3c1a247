//! Background rescan: one abstraction, two interchangeable backends.
//!
//! `Thread` scans on a named OS thread against the shared catalog. `Process`
//! runs `lanmedia rescan` as a child; a waiter thread reaps it and reloads the
//! catalog. Either way completion arrives on a oneshot channel and serving
//! never waits for it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tokio::sync::oneshot;

use lanmedia_catalog::{rescan_all, Catalog, ScanSummary};
use lanmedia_core::{MediaDir, RescanMode, RuntimeConfig};

use crate::error::DaemonError;

/// Hidden subcommand the process backend invokes.
pub const RESCAN_SUBCOMMAND: &str = "rescan";

/// Invocation of the rescan child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanCommand {
    pub program: PathBuf,
    pub db_dir: PathBuf,
    pub dirs: Vec<MediaDir>,
}

impl RescanCommand {
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            RESCAN_SUBCOMMAND.into(),
            "--db-dir".into(),
            self.db_dir.clone().into_os_string(),
        ];
        for dir in &self.dirs {
            args.push("--media-dir".into());
            args.push(dir.to_string().into());
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanBackend {
    Thread,
    Process(RescanCommand),
}

impl RescanBackend {
    /// Backend named by `rescan_mode`; the process backend re-runs the current
    /// executable.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, DaemonError> {
        match config.rescan_mode {
            RescanMode::Thread => Ok(RescanBackend::Thread),
            RescanMode::Process => {
                let program = std::env::current_exe().map_err(|e| {
                    DaemonError::Background(format!("cannot locate own executable: {e}"))
                })?;
                Ok(RescanBackend::Process(RescanCommand {
                    program,
                    db_dir: config.db_dir.clone(),
                    dirs: config.media_dirs.clone(),
                }))
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RescanBackend::Thread => "thread",
            RescanBackend::Process(_) => "process",
        }
    }
}

/// How a finished rescan left the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// Scanned in this process.
    Scanned(ScanSummary),
    /// A child process scanned; `merged` items were reloaded from disk.
    Reloaded { merged: usize },
}

type Completion = Result<RescanOutcome, DaemonError>;

#[derive(Debug)]
pub struct BackgroundTask {
    backend: &'static str,
    done: oneshot::Receiver<Completion>,
}

impl BackgroundTask {
    /// Start a full rescan of `dirs`. Only a failure to launch is returned
    /// here; scan failures arrive through [`wait`](Self::wait).
    pub fn spawn_rescan(
        backend: RescanBackend,
        catalog: Arc<Catalog>,
        dirs: Vec<MediaDir>,
    ) -> Result<Self, DaemonError> {
        let (tx, done) = oneshot::channel();
        let label = backend.label();
        match backend {
            RescanBackend::Thread => {
                std::thread::Builder::new()
                    .name("lanmedia-rescan".to_string())
                    .spawn(move || {
                        let result = rescan_all(&catalog, &dirs)
                            .map(RescanOutcome::Scanned)
                            .map_err(DaemonError::from);
                        let _ = tx.send(result);
                    })
                    .map_err(|e| {
                        DaemonError::Background(format!("cannot start rescan thread: {e}"))
                    })?;
            }
            RescanBackend::Process(command) => {
                let mut child = Command::new(&command.program)
                    .args(command.args())
                    .stdin(Stdio::null())
                    .spawn()
                    .map_err(|e| {
                        DaemonError::Background(format!(
                            "cannot start {}: {e}",
                            command.program.display()
                        ))
                    })?;
                tracing::info!(pid = child.id(), "rescan process started");
                std::thread::Builder::new()
                    .name("lanmedia-rescan-wait".to_string())
                    .spawn(move || {
                        let result = match child.wait() {
                            Ok(status) if status.success() => catalog
                                .reload()
                                .map(|merged| RescanOutcome::Reloaded { merged })
                                .map_err(DaemonError::from),
                            Ok(status) => Err(DaemonError::Background(format!(
                                "rescan process exited with {status}"
                            ))),
                            Err(err) => Err(DaemonError::Background(format!(
                                "cannot reap rescan process: {err}"
                            ))),
                        };
                        let _ = tx.send(result);
                    })
                    .map_err(|e| {
                        DaemonError::Background(format!("cannot start rescan waiter: {e}"))
                    })?;
            }
        }
        tracing::info!(backend = label, "background rescan started");
        Ok(Self {
            backend: label,
            done,
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Wait for the rescan to report.
    pub async fn wait(self) -> Completion {
        self.done.await.unwrap_or_else(|_| {
            Err(DaemonError::Background(
                "rescan worker exited without reporting".to_string(),
            ))
        })
    }

    /// Wait and log the outcome.
    pub async fn report(self) {
        let backend = self.backend;
        match self.wait().await {
            Ok(RescanOutcome::Scanned(summary)) => tracing::info!(
                backend,
                files = summary.files,
                added = summary.added,
                "background rescan finished",
            ),
            Ok(RescanOutcome::Reloaded { merged }) => {
                tracing::info!(backend, merged, "background rescan finished")
            }
            Err(err) => tracing::error!(backend, error = %err, "background rescan failed"),
        }
    }
}
