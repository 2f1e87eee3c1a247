//! Discovery collaborator: SSDP announcements and M-SEARCH replies.
//!
//! Every send is a non-blocking `try_send_to`. A burst reports an error only
//! when none of its datagrams went out.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use chrono::Utc;
use tokio::net::UdpSocket;

use lanmedia_core::{DeviceIdentity, LanAddr};

use crate::paths::{location_url, SSDP_MULTICAST_ADDR, SSDP_PORT};
use crate::sockets::NotifySocket;

pub const ROOT_DEVICE: &str = "upnp:rootdevice";

/// Notification types advertised after the device uuid.
pub const KNOWN_TYPES: [&str; 5] = [
    ROOT_DEVICE,
    "urn:schemas-upnp-org:device:MediaServer:1",
    "urn:schemas-upnp-org:service:ContentDirectory:1",
    "urn:schemas-upnp-org:service:ConnectionManager:1",
    "urn:microsoft.com:service:X_MS_MediaReceiverRegistrar:1",
];

const MAX_DATAGRAM: usize = 1500;

/// Discovery-protocol collaborator driven by the reactor.
pub trait Discovery {
    /// Send one `alive` burst on every notify socket. Returns datagrams sent.
    fn announce(&mut self, sockets: &[NotifySocket], lifetime: Duration) -> io::Result<usize>;

    /// Send one `byebye` burst on every notify socket. Returns datagrams sent.
    fn goodbye(&mut self, sockets: &[NotifySocket]) -> io::Result<usize>;

    /// Drain datagrams waiting on the discovery socket and answer them.
    /// Returns replies sent.
    fn handle_datagram(&mut self, socket: &UdpSocket) -> io::Result<usize>;
}

#[derive(Debug, Clone)]
pub struct Ssdp {
    uuid: String,
    port: u16,
    lan_addrs: Vec<LanAddr>,
    lifetime: Duration,
    target: SocketAddr,
    server: String,
}

impl Ssdp {
    /// `lifetime` is used for search replies; announcements carry their own.
    pub fn new(
        identity: &DeviceIdentity,
        port: u16,
        lan_addrs: Vec<LanAddr>,
        lifetime: Duration,
    ) -> Self {
        Self {
            uuid: identity.uuid.clone(),
            port,
            lan_addrs,
            lifetime,
            target: SocketAddr::V4(SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT)),
            server: format!(
                "{}/{} UPnP/1.0 lanmedia/{}",
                std::env::consts::OS,
                std::env::consts::ARCH,
                env!("CARGO_PKG_VERSION")
            ),
        }
    }

    /// Send announcements to `target` instead of the multicast group.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    /// The device uuid followed by [`KNOWN_TYPES`].
    pub fn notification_types(&self) -> Vec<&str> {
        std::iter::once(self.uuid.as_str())
            .chain(KNOWN_TYPES.iter().copied())
            .collect()
    }

    fn usn(&self, nt: &str) -> String {
        if nt == self.uuid {
            self.uuid.clone()
        } else {
            format!("{}::{nt}", self.uuid)
        }
    }

    pub fn alive_message(&self, addr: Ipv4Addr, nt: &str, lifetime: Duration) -> String {
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             LOCATION: {}\r\n\
             SERVER: {}\r\n\
             NT: {nt}\r\n\
             USN: {}\r\n\
             NTS: ssdp:alive\r\n\
             \r\n",
            lifetime.as_secs(),
            location_url(addr, self.port),
            self.server,
            self.usn(nt),
        )
    }

    pub fn byebye_message(&self, nt: &str) -> String {
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
             NT: {nt}\r\n\
             USN: {}\r\n\
             NTS: ssdp:byebye\r\n\
             \r\n",
            self.usn(nt),
        )
    }

    pub fn search_response(&self, addr: Ipv4Addr, st: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             DATE: {}\r\n\
             ST: {st}\r\n\
             USN: {}\r\n\
             EXT:\r\n\
             SERVER: {}\r\n\
             LOCATION: {}\r\n\
             Content-Length: 0\r\n\
             \r\n",
            self.lifetime.as_secs(),
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT"),
            self.usn(st),
            self.server,
            location_url(addr, self.port),
        )
    }

    /// Advertised address on the requester's subnet, else the first one.
    fn reply_addr(&self, peer: IpAddr) -> Ipv4Addr {
        let first = self
            .lan_addrs
            .first()
            .map(|lan| lan.addr)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        match peer {
            IpAddr::V4(peer) => self
                .lan_addrs
                .iter()
                .find(|lan| lan.contains(peer))
                .map(|lan| lan.addr)
                .unwrap_or(first),
            IpAddr::V6(_) => first,
        }
    }

    /// Search targets a request for `st` matches.
    fn matching_types(&self, st: &str) -> Vec<&str> {
        if st == "ssdp:all" {
            return self.notification_types();
        }
        self.notification_types()
            .into_iter()
            .filter(|nt| *nt == st)
            .collect()
    }

    fn send_burst<F>(&self, sockets: &[NotifySocket], kind: &str, build: F) -> io::Result<usize>
    where
        F: Fn(&NotifySocket, &str) -> String,
    {
        let mut sent = 0usize;
        let mut last_err = None;
        for notify in sockets {
            for nt in self.notification_types() {
                let message = build(notify, nt);
                match notify.socket.try_send_to(message.as_bytes(), self.target) {
                    Ok(_) => sent += 1,
                    Err(err) => {
                        tracing::warn!(addr = %notify.lan.addr, nt, kind, error = %err, "SSDP send failed");
                        last_err = Some(err);
                    }
                }
            }
        }
        match last_err {
            Some(err) if sent == 0 => Err(err),
            _ => Ok(sent),
        }
    }
}

impl Discovery for Ssdp {
    fn announce(&mut self, sockets: &[NotifySocket], lifetime: Duration) -> io::Result<usize> {
        let sent = self.send_burst(sockets, "alive", |notify, nt| {
            self.alive_message(notify.lan.addr, nt, lifetime)
        })?;
        tracing::debug!(sent, lifetime_secs = lifetime.as_secs(), "sent SSDP alive burst");
        Ok(sent)
    }

    fn goodbye(&mut self, sockets: &[NotifySocket]) -> io::Result<usize> {
        let sent = self.send_burst(sockets, "byebye", |_, nt| self.byebye_message(nt))?;
        tracing::debug!(sent, "sent SSDP byebye burst");
        Ok(sent)
    }

    fn handle_datagram(&mut self, socket: &UdpSocket) -> io::Result<usize> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut replies = 0usize;
        loop {
            let (len, peer) = match socket.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(replies),
                Err(err) => return Err(err),
            };
            let Some(st) = parse_search_target(&buf[..len]) else {
                continue;
            };
            let addr = self.reply_addr(peer.ip());
            for nt in self.matching_types(&st) {
                let response = self.search_response(addr, nt);
                match socket.try_send_to(response.as_bytes(), peer) {
                    Ok(_) => replies += 1,
                    Err(err) => {
                        tracing::warn!(peer = %peer, error = %err, "SSDP search reply failed");
                    }
                }
            }
            tracing::debug!(peer = %peer, st = %st, "answered M-SEARCH");
        }
    }
}

/// The `ST` header of an `ssdp:discover` M-SEARCH request.
pub fn parse_search_target(datagram: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(datagram).ok()?;
    let mut lines = text.split("\r\n");
    if !lines.next()?.starts_with("M-SEARCH * HTTP/1.1") {
        return None;
    }
    let mut st = None;
    let mut discover = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_uppercase().as_str() {
            "ST" => st = Some(value.to_string()),
            "MAN" => discover = value.trim_matches('"') == "ssdp:discover",
            _ => {}
        }
    }
    st.filter(|_| discover)
}
