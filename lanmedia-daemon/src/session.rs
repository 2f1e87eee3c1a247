//! Session registry: exclusive owner of every accepted HTTP connection.
//!
//! Per reactor iteration the registry is used in two strict phases: a dispatch
//! pass that hands ready OPEN sessions to the protocol handler, then a reap pass
//! that removes FINISHED sessions and closes their connections. Nothing is
//! removed during dispatch.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;

use futures::FutureExt;
use tokio::io::{Interest, Ready};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Chunk size for non-blocking reads.
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Finished,
}

/// What one non-blocking read pass produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes: usize,
    /// The peer closed its side.
    pub eof: bool,
}

/// One inbound HTTP connection and its buffers.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    created_at: Instant,
    stream: Option<TcpStream>,
    input: Vec<u8>,
    output: Vec<u8>,
    written: usize,
}

impl Session {
    fn new(id: SessionId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            state: SessionState::Open,
            created_at: Instant::now(),
            stream: Some(stream),
            input: Vec::new(),
            output: Vec::new(),
            written: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn has_pending_output(&self) -> bool {
        self.written < self.output.len()
    }

    /// Readiness the session is waiting for: writable while a response is
    /// pending, readable otherwise.
    pub fn interest(&self) -> Interest {
        if self.has_pending_output() {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Read whatever is available without blocking, keeping at most `limit`
    /// buffered bytes.
    pub fn read_available(&mut self, limit: usize) -> io::Result<ReadOutcome> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(ReadOutcome {
                bytes: 0,
                eof: true,
            });
        };
        let mut outcome = ReadOutcome::default();
        let mut chunk = [0u8; READ_CHUNK];
        while self.input.len() < limit {
            let want = (limit - self.input.len()).min(READ_CHUNK);
            match stream.try_read(&mut chunk[..want]) {
                Ok(0) => {
                    outcome.eof = true;
                    break;
                }
                Ok(n) => {
                    self.input.extend_from_slice(&chunk[..n]);
                    outcome.bytes += n;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    pub fn queue_response(&mut self, bytes: Vec<u8>) {
        self.output.extend(bytes);
    }

    /// Write as much pending output as the socket takes. Returns `true` once
    /// everything queued has been written.
    pub fn flush_output(&mut self) -> io::Result<bool> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        while self.written < self.output.len() {
            match stream.try_write(&self.output[self.written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => self.written += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    /// OPEN → FINISHED. Returns `false` if the session was already finished.
    pub fn finish(&mut self) -> bool {
        if self.state == SessionState::Finished {
            return false;
        }
        self.state = SessionState::Finished;
        tracing::debug!(session = %self.id, peer = %self.peer, "session finished");
        true
    }

    /// Close the connection. Only the first call closes anything.
    fn close(&mut self) -> bool {
        self.stream.take().is_some()
    }
}

/// Ordered collection of live sessions, newest first.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: VecDeque<Session>,
    next_id: u64,
    closed: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Connections closed by this registry so far.
    pub fn closed_total(&self) -> u64 {
        self.closed
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Wait for one connection on `listener` and register it.
    pub async fn accept(&mut self, listener: &TcpListener) -> Option<SessionId> {
        let accepted = listener.accept().await;
        self.admit(accepted)
    }

    /// Register the result of a raw accept. Failures are logged, not fatal.
    pub fn admit(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) -> Option<SessionId> {
        match accepted {
            Ok((stream, peer)) => {
                self.next_id += 1;
                let id = SessionId(self.next_id);
                tracing::debug!(session = %id, peer = %peer, "accepted connection");
                self.sessions.push_front(Session::new(id, stream, peer));
                Some(id)
            }
            Err(err) => {
                tracing::error!(error = %err, "accept failed");
                None
            }
        }
    }

    /// Accept connections that are already pending, without waiting, up to
    /// `max`. Returns how many were registered.
    pub fn accept_pending(&mut self, listener: &TcpListener, max: usize) -> usize {
        let mut admitted = 0;
        for _ in 0..max {
            match listener.accept().now_or_never() {
                Some(accepted) => {
                    if self.admit(accepted).is_some() {
                        admitted += 1;
                    }
                }
                None => break,
            }
        }
        admitted
    }

    /// OPEN sessions and the readiness each is waiting for.
    pub fn watch_set(&self) -> impl Iterator<Item = (SessionId, &TcpStream, Interest)> + '_ {
        self.sessions.iter().filter(|s| s.is_open()).filter_map(|s| {
            s.stream
                .as_ref()
                .map(|stream| (s.id, stream, s.interest()))
        })
    }

    /// Hand every OPEN session listed in `ready` to `dispatch`.
    pub fn for_each_readable(
        &mut self,
        ready: &[(SessionId, Ready)],
        mut dispatch: impl FnMut(&mut Session, Ready),
    ) -> usize {
        let mut dispatched = 0;
        for session in self.sessions.iter_mut().filter(|s| s.is_open()) {
            if let Some((_, readiness)) = ready.iter().find(|(id, _)| *id == session.id) {
                dispatch(session, *readiness);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Remove and close every FINISHED session.
    pub fn reap_finished(&mut self) -> Vec<SessionId> {
        let mut reaped = Vec::new();
        let mut kept = VecDeque::with_capacity(self.sessions.len());
        for mut session in self.sessions.drain(..) {
            if session.is_open() {
                kept.push_back(session);
                continue;
            }
            if session.close() {
                self.closed += 1;
            }
            reaped.push(session.id);
        }
        self.sessions = kept;
        reaped
    }

    /// Remove and close every session regardless of state.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for mut session in self.sessions.drain(..) {
            if session.close() {
                self.closed += 1;
            }
            drained += 1;
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn three_accepted_one_finished_reaps_one() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let _clients = [
            TcpStream::connect(addr).await.unwrap(),
            TcpStream::connect(addr).await.unwrap(),
            TcpStream::connect(addr).await.unwrap(),
        ];

        let mut registry = SessionRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(registry.accept(&listener).await.expect("accepted"));
        }
        assert_eq!(registry.len(), 3);

        assert!(registry.get_mut(ids[1]).unwrap().finish());
        let reaped = registry.reap_finished();
        assert_eq!(reaped, vec![ids[1]]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.closed_total(), 1);

        assert!(registry.reap_finished().is_empty());
        assert_eq!(registry.closed_total(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn finished_sessions_are_not_dispatched() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();

        let mut registry = SessionRegistry::new();
        let first = registry.accept(&listener).await.unwrap();
        let second = registry.accept(&listener).await.unwrap();
        registry.get_mut(first).unwrap().finish();
        assert!(!registry.get_mut(first).unwrap().finish());

        let ready = [(first, Ready::READABLE), (second, Ready::READABLE)];
        let mut seen = Vec::new();
        let dispatched = registry.for_each_readable(&ready, |session, _| seen.push(session.id()));
        assert_eq!(dispatched, 1);
        assert_eq!(seen, vec![second]);
        assert_eq!(registry.watch_set().count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn newest_session_comes_first() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();

        let mut registry = SessionRegistry::new();
        let first = registry.accept(&listener).await.unwrap();
        let second = registry.accept(&listener).await.unwrap();
        let order: Vec<SessionId> = registry.watch_set().map(|(id, _, _)| id).collect();
        assert_eq!(order, vec![second, first]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn drain_closes_everything_once() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();

        let mut registry = SessionRegistry::new();
        let first = registry.accept(&listener).await.unwrap();
        registry.accept(&listener).await.unwrap();
        registry.get_mut(first).unwrap().finish();

        assert_eq!(registry.drain(), 2);
        assert_eq!(registry.closed_total(), 2);
        assert_eq!(registry.drain(), 0);
        assert_eq!(registry.closed_total(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn read_available_collects_and_sees_eof() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut registry = SessionRegistry::new();
        let id = registry.accept(&listener).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let session = registry.get_mut(id).unwrap();
        let mut bytes = 0;
        loop {
            let stream = session.stream.as_ref().unwrap();
            stream.ready(Interest::READABLE).await.unwrap();
            let outcome = session.read_available(8192).unwrap();
            bytes += outcome.bytes;
            if outcome.eof {
                break;
            }
        }
        assert_eq!(bytes, 18);
        assert_eq!(session.input(), b"GET / HTTP/1.1\r\n\r\n");
    }
}
