//! Content eventing: tells interested parties that the catalog revision moved.

use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// Eventing collaborator driven by the reactor.
pub trait Eventing {
    /// The catalog revision advanced to `update_id`.
    fn content_changed(&mut self, update_id: u32);

    /// A wake source the reactor adds to its readiness wait, for
    /// implementations holding their own long-lived connections.
    fn wakeup(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Called after [`wakeup`](Self::wakeup) fired.
    fn process_ready(&mut self) {}
}

/// Publishes the current revision on a watch channel.
#[derive(Debug)]
pub struct ContentEvents {
    tx: watch::Sender<u32>,
}

impl ContentEvents {
    pub fn new(update_id: u32) -> Self {
        let (tx, _) = watch::channel(update_id);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u32 {
        *self.tx.borrow()
    }
}

impl Eventing for ContentEvents {
    fn content_changed(&mut self, update_id: u32) {
        self.tx.send_replace(update_id);
        tracing::info!(update_id, "catalog content changed");
    }
}
