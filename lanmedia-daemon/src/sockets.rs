//! Socket manager: the discovery receive socket, the HTTP listen socket and one
//! outbound notify socket per advertised address.
//!
//! Every socket is created through `socket2` so reuse and multicast options can
//! be set before bind, then handed to tokio. Each handle is held in an
//! `Option` (or a `Vec` drained on close) so it is closed exactly once.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, UdpSocket};

use lanmedia_core::{LanAddr, RuntimeConfig};

use crate::error::{socket_err, DaemonError};
use crate::paths::{LISTEN_BACKLOG, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// TTL of outbound discovery datagrams.
pub const NOTIFY_TTL: u32 = 4;

/// Where each socket class binds.
#[derive(Debug, Clone)]
pub struct SocketPlan {
    pub discovery_bind: SocketAddrV4,
    /// Join the discovery multicast group on every advertised address.
    pub join_group: bool,
    pub listen_bind: SocketAddrV4,
    pub notify_addrs: Vec<LanAddr>,
}

impl SocketPlan {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            discovery_bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT),
            join_group: true,
            listen_bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port),
            notify_addrs: config.lan_addrs.clone(),
        }
    }

    /// Every socket on an ephemeral loopback port, no multicast membership.
    pub fn loopback() -> Self {
        Self {
            discovery_bind: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            join_group: false,
            listen_bind: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            notify_addrs: vec![LanAddr::new(Ipv4Addr::LOCALHOST, 8)],
        }
    }
}

/// Outbound discovery socket bound to one advertised address.
#[derive(Debug)]
pub struct NotifySocket {
    pub lan: LanAddr,
    pub socket: UdpSocket,
}

/// Owner of every socket the reactor multiplexes.
#[derive(Debug, Default)]
pub struct Sockets {
    discovery: Option<UdpSocket>,
    listener: Option<TcpListener>,
    notify: Vec<NotifySocket>,
}

impl Sockets {
    /// Open all three socket classes. Any failure is fatal to startup; sockets
    /// opened before the failure are dropped (closed) on return.
    pub fn open(plan: &SocketPlan) -> Result<Self, DaemonError> {
        let discovery = open_discovery_socket(plan)?;
        let listener = open_listen_socket(plan.listen_bind)?;
        let notify = open_notify_sockets(&plan.notify_addrs)?;
        Ok(Self {
            discovery: Some(discovery),
            listener: Some(listener),
            notify,
        })
    }

    pub fn from_parts(
        discovery: Option<UdpSocket>,
        listener: Option<TcpListener>,
        notify: Vec<NotifySocket>,
    ) -> Self {
        Self {
            discovery,
            listener,
            notify,
        }
    }

    pub fn discovery(&self) -> Option<&UdpSocket> {
        self.discovery.as_ref()
    }

    pub fn listener(&self) -> Option<&TcpListener> {
        self.listener.as_ref()
    }

    pub fn notify(&self) -> &[NotifySocket] {
        &self.notify
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Close the discovery and listen sockets. Returns how many were open.
    pub fn close_listeners(&mut self) -> usize {
        let closed = usize::from(self.discovery.take().is_some())
            + usize::from(self.listener.take().is_some());
        if closed > 0 {
            tracing::debug!(closed, "closed discovery and listen sockets");
        }
        closed
    }

    /// Close every notify socket. Returns how many were open.
    pub fn close_notify(&mut self) -> usize {
        let closed = self.notify.drain(..).count();
        if closed > 0 {
            tracing::debug!(closed, "closed notify sockets");
        }
        closed
    }
}

/// UDP socket receiving discovery traffic, joined to the multicast group on
/// every advertised address when the plan asks for it.
pub fn open_discovery_socket(plan: &SocketPlan) -> Result<UdpSocket, DaemonError> {
    let what = || format!("discovery socket {}", plan.discovery_bind);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| socket_err(what(), e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| socket_err(what(), e))?;
    socket
        .bind(&SocketAddr::V4(plan.discovery_bind).into())
        .map_err(|e| socket_err(what(), e))?;

    if plan.join_group {
        for lan in &plan.notify_addrs {
            socket
                .join_multicast_v4(&SSDP_MULTICAST_ADDR, &lan.addr)
                .map_err(|e| socket_err(format!("multicast membership on {}", lan.addr), e))?;
        }
    }
    socket
        .set_nonblocking(true)
        .map_err(|e| socket_err(what(), e))?;
    let socket = UdpSocket::from_std(socket.into()).map_err(|e| socket_err(what(), e))?;
    tracing::debug!(bind = %plan.discovery_bind, "discovery socket open");
    Ok(socket)
}

/// Non-blocking TCP listener with the fixed backlog.
pub fn open_listen_socket(bind: SocketAddrV4) -> Result<TcpListener, DaemonError> {
    let what = || format!("HTTP listen socket {bind}");
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| socket_err(what(), e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| socket_err(what(), e))?;
    socket
        .bind(&SocketAddr::V4(bind).into())
        .map_err(|e| socket_err(what(), e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| socket_err(what(), e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| socket_err(what(), e))?;
    let listener = TcpListener::from_std(socket.into()).map_err(|e| socket_err(what(), e))?;
    tracing::debug!(bind = %bind, backlog = LISTEN_BACKLOG, "HTTP listen socket open");
    Ok(listener)
}

/// One outbound socket per advertised address, so announcements originate
/// from each of them.
pub fn open_notify_sockets(addrs: &[LanAddr]) -> Result<Vec<NotifySocket>, DaemonError> {
    addrs.iter().map(|lan| open_notify_socket(*lan)).collect()
}

fn open_notify_socket(lan: LanAddr) -> Result<NotifySocket, DaemonError> {
    let what = || format!("notify socket on {}", lan.addr);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| socket_err(what(), e))?;
    if let Err(err) = socket.set_multicast_if_v4(&lan.addr) {
        tracing::warn!(addr = %lan.addr, error = %err, "cannot select multicast interface");
    }
    let _ = socket.set_multicast_ttl_v4(NOTIFY_TTL);
    socket
        .bind(&SocketAddr::V4(SocketAddrV4::new(lan.addr, 0)).into())
        .map_err(|e| socket_err(what(), e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| socket_err(what(), e))?;
    let socket = UdpSocket::from_std(socket.into()).map_err(|e| socket_err(what(), e))?;
    Ok(NotifySocket { lan, socket })
}
