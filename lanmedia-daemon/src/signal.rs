//! Process quit flag and the termination-signal boundary.
//!
//! Signal handling never does more than set the flag and wake the reactor;
//! logging and cleanup happen on the reactor side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

use crate::error::DaemonError;

#[derive(Debug, Default)]
struct Inner {
    quitting: AtomicBool,
    wake: Notify,
}

/// Shared "quitting" flag observed by the reactor once per iteration.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal {
    inner: Arc<Inner>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake a pending readiness wait.
    pub fn request(&self) {
        self.inner.quitting.store(true, Ordering::Release);
        self.inner.wake.notify_one();
    }

    pub fn is_set(&self) -> bool {
        self.inner.quitting.load(Ordering::Acquire)
    }

    /// Resolves once [`request`](Self::request) has been called.
    pub async fn notified(&self) {
        if self.is_set() {
            return;
        }
        self.inner.wake.notified().await;
    }
}

/// Install SIGTERM and SIGINT handlers that set `quit`. Must be called from
/// inside the runtime. Failure to register either handler is fatal.
pub fn install_handlers(quit: &QuitSignal) -> Result<(), DaemonError> {
    let mut term = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
    let mut int = signal(SignalKind::interrupt()).map_err(DaemonError::Signal)?;
    let quit = quit.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        quit.request();
    });
    Ok(())
}
