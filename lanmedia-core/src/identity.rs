//! Host-derived defaults: friendly name, device uuid, primary address.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;

/// MAC digits used when no interface address can be read ("UNKNOW" in hex).
pub const FALLBACK_MAC: &str = "554e4b4e4f57";

const UUID_PREFIX: &str = "uuid:4d696e69-444c-164e-9d41-";
const MAC_INTERFACES: [&str; 2] = ["eth0", "eth1"];

/// `<short hostname>: <LOGNAME>`.
pub fn default_friendly_name() -> String {
    let host = fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| fs::read_to_string("/etc/hostname"))
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|raw| short_hostname(&raw))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let user = std::env::var("LOGNAME").unwrap_or_else(|_| "lanmedia".to_string());
    format!("{host}: {user}")
}

pub fn short_hostname(raw: &str) -> String {
    let raw = raw.trim();
    raw.split('.').next().unwrap_or(raw).to_string()
}

/// Device uuid derived from the first readable interface MAC address.
pub fn default_uuid() -> String {
    let mac = MAC_INTERFACES
        .iter()
        .find_map(|iface| read_mac(&Path::new("/sys/class/net").join(iface).join("address")))
        .unwrap_or_else(|| FALLBACK_MAC.to_string());
    uuid_for_mac(&mac)
}

pub fn uuid_for_mac(mac: &str) -> String {
    let digits: String = mac
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(12)
        .collect::<String>()
        .to_ascii_lowercase();
    if digits.len() == 12 {
        format!("{UUID_PREFIX}{digits}")
    } else {
        format!("{UUID_PREFIX}{FALLBACK_MAC}")
    }
}

fn read_mac(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let raw = raw.trim();
    if raw.is_empty() || raw == "00:00:00:00:00:00" {
        return None;
    }
    Some(raw.to_string())
}

/// Address of the interface that routes toward the discovery multicast group.
///
/// No packet is sent; connecting a UDP socket only selects a route.
pub fn detect_primary_addr() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(239, 255, 255, 250), 1900)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
        _ => None,
    }
}
