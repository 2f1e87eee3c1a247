//! Shutdown coordinator. Runs the teardown sequence exactly once; later calls
//! report that nothing was left to do.

use std::sync::Arc;

use lanmedia_catalog::{Catalog, WatchHandle};

use crate::pidfile::PidFile;
use crate::reactor::TeardownParts;
use crate::ssdp::Discovery;

/// What one teardown pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub already_done: bool,
    pub sessions_closed: usize,
    pub listeners_closed: usize,
    pub goodbyes_sent: usize,
    pub notify_closed: usize,
    pub catalog_closed: bool,
    pub pid_file_removed: bool,
}

/// Resources released at shutdown that live outside the reactor.
#[derive(Debug, Default)]
pub struct Teardown {
    done: bool,
    watch: Option<WatchHandle>,
    pid_file: Option<PidFile>,
    catalog: Option<Arc<Catalog>>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_watch(&mut self, watch: WatchHandle) {
        self.watch = Some(watch);
    }

    pub fn set_pid_file(&mut self, pid_file: PidFile) {
        self.pid_file = Some(pid_file);
    }

    pub fn set_catalog(&mut self, catalog: Arc<Catalog>) {
        self.catalog = Some(catalog);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Full sequence after the reactor stopped.
    pub fn run<D: Discovery>(&mut self, parts: TeardownParts<'_, D>) -> ShutdownReport {
        if self.done {
            return ShutdownReport {
                already_done: true,
                ..ShutdownReport::default()
            };
        }
        self.done = true;
        let TeardownParts {
            sessions,
            sockets,
            discovery,
            update_id,
        } = parts;
        let mut report = ShutdownReport::default();

        report.sessions_closed = sessions.drain();
        report.listeners_closed = sockets.close_listeners();

        if !sockets.notify().is_empty() {
            match discovery.goodbye(sockets.notify()) {
                Ok(sent) => report.goodbyes_sent = sent,
                Err(err) => tracing::warn!(error = %err, "leaving announcement failed"),
            }
        }
        report.notify_closed = sockets.close_notify();

        report.catalog_closed = self.close_catalog(Some(update_id));
        report.pid_file_removed = self.remove_pid_file();

        tracing::info!(
            sessions = report.sessions_closed,
            goodbyes = report.goodbyes_sent,
            update_id,
            "shutdown complete",
        );
        report
    }

    /// Release what startup acquired when it failed before the reactor ran.
    pub fn abort(&mut self) -> ShutdownReport {
        if self.done {
            return ShutdownReport {
                already_done: true,
                ..ShutdownReport::default()
            };
        }
        self.done = true;
        ShutdownReport {
            catalog_closed: self.close_catalog(None),
            pid_file_removed: self.remove_pid_file(),
            ..ShutdownReport::default()
        }
    }

    /// Stop the live watch, persist the revision, close the catalog.
    fn close_catalog(&mut self, update_id: Option<u32>) -> bool {
        if let Some(mut watch) = self.watch.take() {
            watch.stop();
        }
        let Some(catalog) = self.catalog.take() else {
            return false;
        };
        if let Some(update_id) = update_id {
            if let Err(err) = catalog.set_update_id(update_id) {
                tracing::error!(error = %err, update_id, "cannot persist update id");
            }
        }
        match catalog.close() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "catalog close failed");
                false
            }
        }
    }

    fn remove_pid_file(&mut self) -> bool {
        let Some(mut pid_file) = self.pid_file.take() else {
            return false;
        };
        match pid_file.remove() {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(path = %pid_file.path().display(), error = %err, "cannot remove pid file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingEvents;
    use crate::reactor::testing::{FinishingHandler, RecordingDiscovery, SharedCounter};
    use crate::reactor::{Collaborators, Reactor};
    use crate::revision::RevisionTracker;
    use crate::schedule::AnnounceSchedule;
    use crate::signal::QuitSignal;
    use crate::sockets::{SocketPlan, Sockets};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio::time::Instant;

    type TestReactor = Reactor<RecordingDiscovery, FinishingHandler, RecordingEvents, SharedCounter>;

    fn reactor(sockets: Sockets, update_id: u32) -> TestReactor {
        Reactor::new(
            sockets,
            Collaborators {
                discovery: RecordingDiscovery::default(),
                handler: FinishingHandler::default(),
                events: RecordingEvents::default(),
                counter: SharedCounter::default(),
            },
            AnnounceSchedule::new(Instant::now(), Duration::from_secs(30)),
            RevisionTracker::new(update_id, 0),
            QuitSignal::new(),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn second_shutdown_does_nothing_more() {
        let db = TempDir::new().unwrap();
        let run = TempDir::new().unwrap();
        let pid_path = run.path().join("lanmedia.pid");

        let sockets = Sockets::open(&SocketPlan::loopback()).unwrap();
        let addr = sockets.listen_addr().unwrap();
        let mut reactor = reactor(sockets, 7);
        let _client = TcpStream::connect(addr).await.unwrap();
        while reactor.sessions().is_empty() {
            reactor.run_once().await.unwrap();
        }

        let mut teardown = Teardown::new();
        teardown.set_catalog(Arc::new(Catalog::open(db.path()).unwrap()));
        teardown.set_pid_file(PidFile::acquire(&pid_path).unwrap());

        let first = teardown.run(reactor.teardown_parts());
        assert_eq!(first.sessions_closed, 1);
        assert_eq!(first.listeners_closed, 2);
        assert_eq!(first.goodbyes_sent, 1);
        assert_eq!(first.notify_closed, 1);
        assert!(first.catalog_closed);
        assert!(first.pid_file_removed);
        assert!(!pid_path.exists());

        let second = teardown.run(reactor.teardown_parts());
        assert!(second.already_done);
        assert_eq!(second.goodbyes_sent, 0);
        assert_eq!(reactor.discovery().goodbyes, vec![1]);
        assert!(reactor.sockets().listener().is_none());

        let reopened = Catalog::open(db.path()).unwrap();
        assert_eq!(reopened.update_id().unwrap(), 7);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn no_notify_sockets_means_no_goodbye() {
        let mut reactor = reactor(Sockets::default(), 0);
        let report = Teardown::new().run(reactor.teardown_parts());
        assert_eq!(report.goodbyes_sent, 0);
        assert!(reactor.discovery().goodbyes.is_empty());
        assert!(!report.catalog_closed);
    }

    #[test]
    fn abort_releases_pid_file_once() {
        let run = TempDir::new().unwrap();
        let pid_path = run.path().join("lanmedia.pid");
        let mut teardown = Teardown::new();
        teardown.set_pid_file(PidFile::acquire(&pid_path).unwrap());

        assert!(teardown.abort().pid_file_removed);
        assert!(!pid_path.exists());
        assert!(teardown.abort().already_done);
        assert!(teardown.is_done());
    }
}
