//! Domain types for the lanmedia runtime configuration.
//!
//! [`RuntimeConfig`] is assembled once at startup (see [`crate::config`]) and
//! is read-only afterwards; every daemon component borrows it.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seconds between discovery re-announcements when nothing is configured.
pub const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 30;
/// Longest accepted announce interval: one day.
pub const MAX_NOTIFY_INTERVAL_SECS: u64 = 86_400;

/// Maximum number of advertised listening addresses.
pub const MAX_LAN_ADDR: usize = 4;

/// Network prefix assumed when an address is given without `/bits`.
pub const DEFAULT_PREFIX_LEN: u32 = 24;

// ---------------------------------------------------------------------------
// Listening addresses
// ---------------------------------------------------------------------------

/// One advertised IPv4 address together with its network mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanAddr {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl LanAddr {
    pub fn new(addr: Ipv4Addr, prefix_len: u32) -> Self {
        let bits = match prefix_len.min(32) {
            0 => 0,
            n => u32::MAX << (32 - n),
        };
        Self {
            addr,
            mask: Ipv4Addr::from(bits),
        }
    }

    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).leading_ones()
    }

    /// True when `ip` is on the same subnet as this address.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(self.addr) & mask == u32::from(ip) & mask
    }
}

impl FromStr for LanAddr {
    type Err = ConfigError;

    /// Parses `a.b.c.d` or `a.b.c.d/bits`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidAddress(s.to_string());
        let (addr, bits) = match s.split_once('/') {
            Some((addr, bits)) => (addr, bits.trim().parse::<u32>().map_err(|_| invalid())?),
            None => (s, DEFAULT_PREFIX_LEN),
        };
        if addr.len() > 15 || bits > 32 {
            return Err(invalid());
        }
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        Ok(Self::new(addr, bits))
    }
}

impl fmt::Display for LanAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len())
    }
}

// ---------------------------------------------------------------------------
// Media classification
// ---------------------------------------------------------------------------

/// The kind of a single catalogued media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

/// Content-type filter declared for a media directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFilter {
    #[default]
    All,
    Audio,
    Video,
    Images,
}

impl ContentFilter {
    pub fn accepts(self, kind: MediaKind) -> bool {
        match self {
            ContentFilter::All => true,
            ContentFilter::Audio => kind == MediaKind::Audio,
            ContentFilter::Video => kind == MediaKind::Video,
            ContentFilter::Images => kind == MediaKind::Image,
        }
    }

    /// The one-letter prefix used in `media_dir` entries, if any.
    pub fn prefix(self) -> Option<char> {
        match self {
            ContentFilter::All => None,
            ContentFilter::Audio => Some('A'),
            ContentFilter::Video => Some('V'),
            ContentFilter::Images => Some('P'),
        }
    }
}

/// A configured media directory and the kinds of media taken from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDir {
    pub path: PathBuf,
    pub filter: ContentFilter,
}

impl FromStr for MediaDir {
    type Err = ConfigError;

    /// Parses `/path`, or `A,/path` / `V,/path` / `P,/path` (the comma is
    /// optional). Only syntax is checked here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidMediaDir(s.to_string());
        let mut chars = s.chars();
        let filter = match chars.next() {
            Some('/') => ContentFilter::All,
            Some('A' | 'a') => ContentFilter::Audio,
            Some('V' | 'v') => ContentFilter::Video,
            Some('P' | 'p') => ContentFilter::Images,
            _ => return Err(invalid()),
        };
        let path = match filter {
            ContentFilter::All => s,
            _ => {
                let rest = chars.as_str();
                rest.strip_prefix(',').unwrap_or(rest)
            }
        };
        if !path.starts_with('/') {
            return Err(invalid());
        }
        Ok(Self {
            path: PathBuf::from(path),
            filter,
        })
    }
}

impl fmt::Display for MediaDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filter.prefix() {
            Some(prefix) => write!(f, "{prefix},{}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Behavioural switches
// ---------------------------------------------------------------------------

/// Which start time uptime reporting is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UptimeSource {
    #[default]
    Daemon,
    System,
}

/// How the full catalog rescan runs after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RescanMode {
    /// A background thread sharing the catalog with the reactor.
    #[default]
    Thread,
    /// A child `lanmedia rescan` process; the catalog is reloaded when it exits.
    Process,
}

impl FromStr for RescanMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(RescanMode::Thread),
            "process" | "fork" => Ok(RescanMode::Process),
            other => Err(ConfigError::InvalidValue {
                key: "rescan_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RescanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescanMode::Thread => write!(f, "thread"),
            RescanMode::Process => write!(f, "process"),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Strings the device advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub friendly_name: String,
    pub serial: String,
    pub model_number: String,
    /// Full `uuid:…` device identifier.
    pub uuid: String,
}

/// Settings fixed at startup and shared read-only by every component.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: u16,
    pub notify_interval: Duration,
    /// Never empty; the first entry is the primary address.
    pub lan_addrs: Vec<LanAddr>,
    pub presentation_url: String,
    pub identity: DeviceIdentity,
    pub media_dirs: Vec<MediaDir>,
    pub inotify: bool,
    pub uptime: UptimeSource,
    pub rescan_mode: RescanMode,
    pub force_rescan: bool,
    pub db_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_file: PathBuf,
    pub debug: bool,
}

impl RuntimeConfig {
    pub fn primary_addr(&self) -> Ipv4Addr {
        self.lan_addrs
            .first()
            .map(|lan| lan.addr)
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
