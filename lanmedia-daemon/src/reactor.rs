//! The reactor: one task multiplexing the discovery socket, the HTTP listen
//! socket, every open session and the periodic timers.
//!
//! Each iteration waits once (bounded by the scheduler's next deadline), runs
//! whatever timers are due, then handles readiness in a fixed order:
//! discovery, eventing, sessions, accept, reap, quit check.

use std::future::pending;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::io::Ready;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DaemonError;
use crate::events::Eventing;
use crate::http::SessionHandler;
use crate::paths::LISTEN_BACKLOG;
use crate::revision::{ChangeCounter, RevisionTracker};
use crate::schedule::AnnounceSchedule;
use crate::session::{SessionId, SessionRegistry};
use crate::signal::QuitSignal;
use crate::sockets::Sockets;
use crate::ssdp::Discovery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Running,
    Stopping,
}

/// Everything one readiness wait observed.
#[derive(Debug, Default)]
pub struct ReadySet {
    pub quit: bool,
    pub discovery: bool,
    pub accepted: Vec<io::Result<(TcpStream, SocketAddr)>>,
    pub sessions: Vec<(SessionId, Ready)>,
    pub eventing: bool,
    pub timed_out: bool,
}

/// The protocol collaborators a reactor drives.
#[derive(Debug)]
pub struct Collaborators<D, H, E, C> {
    pub discovery: D,
    pub handler: H,
    pub events: E,
    pub counter: C,
}

/// Borrowed reactor state handed to the shutdown coordinator.
pub struct TeardownParts<'a, D> {
    pub sessions: &'a mut SessionRegistry,
    pub sockets: &'a mut Sockets,
    pub discovery: &'a mut D,
    pub update_id: u32,
}

#[derive(Debug)]
pub struct Reactor<D, H, E, C> {
    sockets: Sockets,
    sessions: SessionRegistry,
    schedule: AnnounceSchedule,
    revision: RevisionTracker,
    discovery: D,
    handler: H,
    events: E,
    counter: C,
    quit: QuitSignal,
    state: ReactorState,
    announces: u64,
}

impl<D, H, E, C> Reactor<D, H, E, C>
where
    D: Discovery,
    H: SessionHandler,
    E: Eventing,
    C: ChangeCounter,
{
    pub fn new(
        sockets: Sockets,
        collaborators: Collaborators<D, H, E, C>,
        schedule: AnnounceSchedule,
        revision: RevisionTracker,
        quit: QuitSignal,
    ) -> Self {
        let Collaborators {
            discovery,
            handler,
            events,
            counter,
        } = collaborators;
        Self {
            sockets,
            sessions: SessionRegistry::new(),
            schedule,
            revision,
            discovery,
            handler,
            events,
            counter,
            quit,
            state: ReactorState::Running,
            announces: 0,
        }
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    pub fn update_id(&self) -> u32 {
        self.revision.update_id()
    }

    /// Announce bursts sent so far.
    pub fn announces(&self) -> u64 {
        self.announces
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn sockets(&self) -> &Sockets {
        &self.sockets
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn teardown_parts(&mut self) -> TeardownParts<'_, D> {
        TeardownParts {
            sessions: &mut self.sessions,
            sockets: &mut self.sockets,
            discovery: &mut self.discovery,
            update_id: self.revision.update_id(),
        }
    }

    /// Iterate until the quit signal is observed.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        tracing::info!(
            listen = ?self.sockets.listen_addr(),
            notify_sockets = self.sockets.notify().len(),
            "reactor running",
        );
        while self.run_once().await? == ReactorState::Running {}
        tracing::info!(update_id = self.update_id(), "reactor stopping");
        Ok(())
    }

    /// One reactor iteration.
    pub async fn run_once(&mut self) -> Result<ReactorState, DaemonError> {
        if self.state == ReactorState::Stopping {
            return Ok(self.state);
        }

        let budget = self.schedule.next_deadline(Instant::now());
        let wake = self.events.wakeup();
        let waited = wait_ready(&self.sockets, &self.sessions, wake, &self.quit, budget).await;
        let ready = match waited {
            Ok(ready) => ready,
            Err(err) => return self.wait_failed(err),
        };

        self.run_due_timers(Instant::now());

        if ready.discovery {
            if let Some(socket) = self.sockets.discovery() {
                match self.discovery.handle_datagram(socket) {
                    Ok(0) => {}
                    Ok(replies) => tracing::debug!(replies, "answered discovery search"),
                    Err(err) => tracing::warn!(error = %err, "discovery datagram handling failed"),
                }
            }
        }

        if ready.eventing {
            self.events.process_ready();
        }

        let handler = &mut self.handler;
        self.sessions
            .for_each_readable(&ready.sessions, |session, readiness| {
                handler.on_ready(session, readiness)
            });

        if !ready.accepted.is_empty() {
            for accepted in ready.accepted {
                self.sessions.admit(accepted);
            }
            if let Some(listener) = self.sockets.listener() {
                self.sessions
                    .accept_pending(listener, LISTEN_BACKLOG as usize);
            }
        }

        let reaped = self.sessions.reap_finished();
        if !reaped.is_empty() {
            tracing::debug!(reaped = reaped.len(), open = self.sessions.len(), "reaped sessions");
        }

        if ready.quit || self.quit.is_set() {
            self.state = ReactorState::Stopping;
        }
        Ok(self.state)
    }

    /// A failed readiness wait is fatal unless the process is quitting.
    fn wait_failed(&mut self, err: io::Error) -> Result<ReactorState, DaemonError> {
        if self.quit.is_set() {
            tracing::debug!(error = %err, "readiness wait interrupted by quit");
            self.state = ReactorState::Stopping;
            return Ok(self.state);
        }
        tracing::error!(error = %err, "readiness wait failed");
        Err(DaemonError::Wait(err))
    }

    fn run_due_timers(&mut self, now: Instant) {
        let due = self.schedule.due_actions(now);
        if let Some(lifetime) = due.announce {
            self.announces += 1;
            match self.discovery.announce(self.sockets.notify(), lifetime) {
                Ok(sent) => tracing::debug!(sent, lifetime_secs = lifetime.as_secs(), "announced"),
                Err(err) => tracing::warn!(error = %err, "announcement failed"),
            }
        }
        if due.revision_poll {
            self.revision
                .poll_and_maybe_advance(&self.counter, &mut self.events);
        }
    }
}

// ---------------------------------------------------------------------------
// Readiness wait
// ---------------------------------------------------------------------------

/// Block until something is ready or `budget` elapses, then collect whatever
/// else is already ready without waiting again.
pub async fn wait_ready(
    sockets: &Sockets,
    sessions: &SessionRegistry,
    wake: Option<Arc<Notify>>,
    quit: &QuitSignal,
    budget: Duration,
) -> io::Result<ReadySet> {
    let mut ready = ReadySet::default();
    let mut session_waits: FuturesUnordered<_> = sessions
        .watch_set()
        .map(|(id, stream, interest)| async move {
            let readiness = stream
                .ready(interest)
                .await
                .unwrap_or(Ready::READABLE | Ready::WRITABLE);
            (id, readiness)
        })
        .collect();

    tokio::select! {
        _ = quit.notified() => ready.quit = true,
        readable = discovery_readable(sockets.discovery()) => {
            readable?;
            ready.discovery = true;
        }
        accepted = accept_one(sockets.listener()) => ready.accepted.push(accepted),
        Some(session) = session_waits.next(), if !session_waits.is_empty() => {
            ready.sessions.push(session);
        }
        _ = eventing_woken(wake.as_deref()) => ready.eventing = true,
        _ = tokio::time::sleep(budget) => ready.timed_out = true,
    }

    ready.quit |= quit.is_set();
    if !ready.discovery {
        if let Some(socket) = sockets.discovery() {
            ready.discovery = matches!(socket.readable().now_or_never(), Some(Ok(())));
        }
    }
    if ready.accepted.is_empty() {
        if let Some(accepted) = sockets.listener().and_then(|l| l.accept().now_or_never()) {
            ready.accepted.push(accepted);
        }
    }
    while let Some(Some(session)) = session_waits.next().now_or_never() {
        ready.sessions.push(session);
    }
    if !ready.eventing {
        if let Some(wake) = wake.as_deref() {
            ready.eventing = wake.notified().now_or_never().is_some();
        }
    }
    Ok(ready)
}

async fn discovery_readable(socket: Option<&UdpSocket>) -> io::Result<()> {
    match socket {
        Some(socket) => socket.readable().await,
        None => pending().await,
    }
}

async fn accept_one(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => pending().await,
    }
}

async fn eventing_woken(wake: Option<&Notify>) {
    match wake {
        Some(wake) => wake.notified().await,
        None => pending().await,
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
