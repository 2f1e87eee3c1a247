use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

/// Pending-connection queue depth of the HTTP listen socket.
pub const LISTEN_BACKLOG: i32 = 6;

/// How often the catalog mutation counter is polled.
pub const REVISION_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const LOG_FILE: &str = "lanmedia.log";
pub const ROOT_DESC_PATH: &str = "/rootDesc.xml";
pub const STATUS_PATH: &str = "/status";

pub fn log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE)
}

pub fn location_url(addr: Ipv4Addr, port: u16) -> String {
    format!("http://{addr}:{port}{ROOT_DESC_PATH}")
}
