//! lanmedia daemon: the reactor, startup and shutdown choreography, and the
//! default discovery, HTTP and eventing collaborators.

pub mod background;
mod error;
pub mod events;
pub mod http;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod pidfile;
pub mod reactor;
pub mod revision;
mod runtime;
pub mod schedule;
pub mod session;
pub mod shutdown;
pub mod signal;
pub mod sockets;
pub mod ssdp;
pub mod startup;
pub mod uptime;

#[cfg(test)]
mod test_support;

pub use error::DaemonError;
pub use reactor::{Reactor, ReactorState};
pub use runtime::{run, serve, start_blocking, DaemonContext};
pub use shutdown::ShutdownReport;
pub use signal::QuitSignal;
pub use sockets::SocketPlan;
