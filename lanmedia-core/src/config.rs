//! Options file parsing and the command-line merge.
//!
//! # Precedence
//!
//! ```text
//! built-in defaults  <  options file  <  command line
//! ```
//!
//! List options (`listening_ip`, `media_dir`) accumulate across sources; every
//! other option is overwritten by the later source.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, ConfigError};
use crate::identity;
use crate::types::{
    DeviceIdentity, LanAddr, MediaDir, RescanMode, RuntimeConfig, UptimeSource,
    DEFAULT_NOTIFY_INTERVAL_SECS, MAX_LAN_ADDR, MAX_NOTIFY_INTERVAL_SECS,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/lanmedia.conf";
pub const DEFAULT_DB_DIR: &str = "/var/cache/lanmedia";
pub const DEFAULT_LOG_DIR: &str = "/var/log";
pub const DEFAULT_PID_FILE: &str = "/var/run/lanmedia.pid";
pub const DEFAULT_SERIAL: &str = "12345678";
pub const DEFAULT_MODEL_NUMBER: &str = "1";

// ---------------------------------------------------------------------------
// 1. Options file
// ---------------------------------------------------------------------------

/// Every key understood in the options file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    ListeningIp,
    Port,
    PresentationUrl,
    NotifyInterval,
    SystemUptime,
    Serial,
    ModelNumber,
    FriendlyName,
    MediaDir,
    Inotify,
    DbDir,
    LogDir,
    RescanMode,
}

impl OptionKey {
    pub const ALL: [OptionKey; 13] = [
        OptionKey::ListeningIp,
        OptionKey::Port,
        OptionKey::PresentationUrl,
        OptionKey::NotifyInterval,
        OptionKey::SystemUptime,
        OptionKey::Serial,
        OptionKey::ModelNumber,
        OptionKey::FriendlyName,
        OptionKey::MediaDir,
        OptionKey::Inotify,
        OptionKey::DbDir,
        OptionKey::LogDir,
        OptionKey::RescanMode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptionKey::ListeningIp => "listening_ip",
            OptionKey::Port => "port",
            OptionKey::PresentationUrl => "presentation_url",
            OptionKey::NotifyInterval => "notify_interval",
            OptionKey::SystemUptime => "system_uptime",
            OptionKey::Serial => "serial",
            OptionKey::ModelNumber => "model_number",
            OptionKey::FriendlyName => "friendly_name",
            OptionKey::MediaDir => "media_dir",
            OptionKey::Inotify => "inotify",
            OptionKey::DbDir => "db_dir",
            OptionKey::LogDir => "log_dir",
            OptionKey::RescanMode => "rescan_mode",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

/// One `key = value` line from the options file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub key: OptionKey,
    pub value: String,
    /// 1-based line number, for diagnostics.
    pub line: usize,
}

/// Parse options file contents. Unknown keys are logged and skipped.
pub fn parse_options(contents: &str, path: &Path) -> Result<Vec<OptionEntry>, ConfigError> {
    let mut entries = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax {
                path: path.to_path_buf(),
                line: index + 1,
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Syntax {
                path: path.to_path_buf(),
                line: index + 1,
            });
        }
        match OptionKey::from_name(key) {
            Some(option) => entries.push(OptionEntry {
                key: option,
                value: value.trim().to_string(),
                line: index + 1,
            }),
            None => tracing::warn!(
                path = %path.display(),
                line = index + 1,
                key,
                "unknown option in options file",
            ),
        }
    }
    Ok(entries)
}

pub fn read_options_file(path: &Path) -> Result<Vec<OptionEntry>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_options(&contents, path)
}

// ---------------------------------------------------------------------------
// 2. Command-line overrides
// ---------------------------------------------------------------------------

/// Values supplied on the command line. `None`/`false`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub listen: Vec<String>,
    pub port: Option<u16>,
    pub notify_interval: Option<u64>,
    pub serial: Option<String>,
    pub model_number: Option<String>,
    pub friendly_name: Option<String>,
    pub presentation_url: Option<String>,
    pub system_uptime: bool,
    pub pid_file: Option<PathBuf>,
    pub debug: bool,
    pub force_rescan: bool,
    pub media_dirs: Vec<String>,
    pub db_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub rescan_mode: Option<RescanMode>,
    pub no_inotify: bool,
}

// ---------------------------------------------------------------------------
// 3. Builder
// ---------------------------------------------------------------------------

/// Accumulates option values, then validates them into a [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    port: Option<u16>,
    notify_interval: u64,
    lan_addrs: Vec<LanAddr>,
    presentation_url: Option<String>,
    friendly_name: Option<String>,
    serial: String,
    model_number: String,
    uuid: Option<String>,
    media_dirs: Vec<MediaDir>,
    inotify: bool,
    uptime: UptimeSource,
    rescan_mode: RescanMode,
    force_rescan: bool,
    db_dir: PathBuf,
    log_dir: PathBuf,
    pid_file: PathBuf,
    debug: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            port: None,
            notify_interval: DEFAULT_NOTIFY_INTERVAL_SECS,
            lan_addrs: Vec::new(),
            presentation_url: None,
            friendly_name: None,
            serial: DEFAULT_SERIAL.to_string(),
            model_number: DEFAULT_MODEL_NUMBER.to_string(),
            uuid: None,
            media_dirs: Vec::new(),
            inotify: true,
            uptime: UptimeSource::Daemon,
            rescan_mode: RescanMode::Thread,
            force_rescan: false,
            db_dir: PathBuf::from(DEFAULT_DB_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            debug: false,
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the device uuid instead of deriving it from the host MAC address.
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn apply_options(&mut self, entries: &[OptionEntry]) -> Result<(), ConfigError> {
        for entry in entries {
            let value = entry.value.as_str();
            match entry.key {
                OptionKey::ListeningIp => {
                    self.add_lan_addr(value);
                }
                OptionKey::Port => self.port = Some(parse_number(entry.key, value)?),
                OptionKey::PresentationUrl => self.presentation_url = Some(value.to_string()),
                OptionKey::NotifyInterval => {
                    self.notify_interval = parse_number(entry.key, value)?;
                }
                OptionKey::SystemUptime => {
                    if value == "yes" {
                        self.uptime = UptimeSource::System;
                    }
                }
                OptionKey::Serial => self.serial = value.to_string(),
                OptionKey::ModelNumber => self.model_number = value.to_string(),
                OptionKey::FriendlyName => self.friendly_name = Some(value.to_string()),
                OptionKey::MediaDir => {
                    self.add_media_dir(value);
                }
                OptionKey::Inotify => self.inotify = parse_switch(value),
                OptionKey::DbDir => self.db_dir = PathBuf::from(value),
                OptionKey::LogDir => self.log_dir = PathBuf::from(value),
                OptionKey::RescanMode => self.rescan_mode = value.parse()?,
            }
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        for raw in &overrides.listen {
            self.add_lan_addr(raw);
        }
        if let Some(port) = overrides.port {
            self.port = Some(port);
        }
        if let Some(interval) = overrides.notify_interval {
            self.notify_interval = interval;
        }
        if let Some(serial) = &overrides.serial {
            self.serial = serial.clone();
        }
        if let Some(model) = &overrides.model_number {
            self.model_number = model.clone();
        }
        if let Some(name) = &overrides.friendly_name {
            self.friendly_name = Some(name.clone());
        }
        if let Some(url) = &overrides.presentation_url {
            self.presentation_url = Some(url.clone());
        }
        if overrides.system_uptime {
            self.uptime = UptimeSource::System;
        }
        if let Some(pid_file) = &overrides.pid_file {
            self.pid_file = pid_file.clone();
        }
        self.debug |= overrides.debug;
        self.force_rescan |= overrides.force_rescan;
        for raw in &overrides.media_dirs {
            self.add_media_dir(raw);
        }
        if let Some(dir) = &overrides.db_dir {
            self.db_dir = dir.clone();
        }
        if let Some(dir) = &overrides.log_dir {
            self.log_dir = dir.clone();
        }
        if let Some(mode) = overrides.rescan_mode {
            self.rescan_mode = mode;
        }
        if overrides.no_inotify {
            self.inotify = false;
        }
        Ok(())
    }

    /// Add a listening address. Returns `false` when it was ignored
    /// (unparseable, duplicate, or over the [`MAX_LAN_ADDR`] limit).
    pub fn add_lan_addr(&mut self, raw: &str) -> bool {
        let lan = match raw.parse::<LanAddr>() {
            Ok(lan) => lan,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring listening address");
                return false;
            }
        };
        if self.lan_addrs.iter().any(|known| known.addr == lan.addr) {
            return false;
        }
        if self.lan_addrs.len() >= MAX_LAN_ADDR {
            tracing::warn!(
                max = MAX_LAN_ADDR,
                address = raw,
                "too many listening ips, ignoring",
            );
            return false;
        }
        self.lan_addrs.push(lan);
        true
    }

    /// Add a media directory entry. Malformed entries are logged and skipped.
    pub fn add_media_dir(&mut self, raw: &str) -> bool {
        match raw.parse::<MediaDir>() {
            Ok(dir) => {
                self.media_dirs.push(dir);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring media directory");
                false
            }
        }
    }

    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let port = match self.port {
            Some(port) if port > 0 => port,
            _ => return Err(ConfigError::NoPort),
        };
        if !(1..=MAX_NOTIFY_INTERVAL_SECS).contains(&self.notify_interval) {
            return Err(ConfigError::InvalidValue {
                key: OptionKey::NotifyInterval.name().to_string(),
                value: self.notify_interval.to_string(),
            });
        }

        let mut lan_addrs = self.lan_addrs;
        if lan_addrs.is_empty() {
            let detected = identity::detect_primary_addr().ok_or(ConfigError::NoAddress)?;
            lan_addrs.push(LanAddr::new(detected, crate::types::DEFAULT_PREFIX_LEN));
        }

        let presentation_url = self
            .presentation_url
            .unwrap_or_else(|| format!("http://{}/", lan_addrs[0].addr));

        let media_dirs = self
            .media_dirs
            .into_iter()
            .filter_map(|dir| match std::fs::canonicalize(&dir.path) {
                Ok(path) if path.is_dir() => Some(MediaDir {
                    path,
                    filter: dir.filter,
                }),
                _ => {
                    tracing::warn!(path = %dir.path.display(), "media directory not accessible");
                    None
                }
            })
            .collect();

        Ok(RuntimeConfig {
            port,
            notify_interval: Duration::from_secs(self.notify_interval),
            lan_addrs,
            presentation_url,
            identity: DeviceIdentity {
                friendly_name: self
                    .friendly_name
                    .unwrap_or_else(identity::default_friendly_name),
                serial: self.serial,
                model_number: self.model_number,
                uuid: self.uuid.unwrap_or_else(identity::default_uuid),
            },
            media_dirs,
            inotify: self.inotify,
            uptime: self.uptime,
            rescan_mode: self.rescan_mode,
            force_rescan: self.force_rescan,
            db_dir: self.db_dir,
            log_dir: self.log_dir,
            pid_file: self.pid_file,
            debug: self.debug,
        })
    }
}

/// Read the options file named by `overrides` (or the default one), merge the
/// command line on top, and validate.
///
/// A missing default options file is not an error; a missing file named with
/// `-f` is.
pub fn load(overrides: &Overrides) -> Result<RuntimeConfig, ConfigError> {
    let (path, explicit) = match &overrides.config_file {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let mut builder = ConfigBuilder::new();
    match read_options_file(&path) {
        Ok(entries) => builder.apply_options(&entries)?,
        Err(ConfigError::Io { source, .. })
            if !explicit && source.kind() == ErrorKind::NotFound =>
        {
            tracing::debug!(path = %path.display(), "no options file, using defaults");
        }
        Err(err) => return Err(err),
    }
    builder.apply_overrides(overrides)?;
    builder.build()
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn parse_number<T: std::str::FromStr>(key: OptionKey, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.name().to_string(),
        value: value.to_string(),
    })
}

/// `yes` or any non-zero number enables a switch.
fn parse_switch(value: &str) -> bool {
    value == "yes" || value.parse::<i64>().map(|n| n != 0).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentFilter;
    use rstest::rstest;
    use tempfile::TempDir;

    fn builder() -> ConfigBuilder {
        ConfigBuilder::new().uuid("uuid:test")
    }

    #[test]
    fn parse_skips_comments_and_unknown_keys() {
        let text = "# comment\n\nport = 8200\nwhatever = 1\n  friendly_name =  Living Room \n";
        let entries = parse_options(text, Path::new("test.conf")).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, OptionKey::Port);
        assert_eq!(entries[1].value, "Living Room");
        assert_eq!(entries[1].line, 5);
    }

    #[test]
    fn parse_rejects_line_without_equals() {
        let err = parse_options("port 8200\n", Path::new("bad.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }), "got: {err}");
        assert!(err.to_string().contains("bad.conf:1"));
    }

    #[test]
    fn option_names_round_trip() {
        for key in OptionKey::ALL {
            assert_eq!(OptionKey::from_name(key.name()), Some(key));
        }
    }

    #[test]
    fn build_requires_port() {
        let mut b = builder();
        b.add_lan_addr("192.168.1.2");
        assert!(matches!(b.build(), Err(ConfigError::NoPort)));
    }

    #[test]
    fn build_defaults_interval_and_presentation_url() {
        let mut b = builder();
        b.add_lan_addr("192.168.1.2/24");
        b.apply_overrides(&Overrides {
            port: Some(8200),
            ..Default::default()
        })
        .unwrap();
        let config = b.build().expect("build");
        assert_eq!(config.notify_interval, Duration::from_secs(30));
        assert_eq!(config.presentation_url, "http://192.168.1.2/");
        assert_eq!(config.identity.serial, DEFAULT_SERIAL);
        assert!(config.inotify);
    }

    #[test]
    fn command_line_overrides_file_values() {
        let entries = parse_options(
            "port = 8200\nnotify_interval = 60\nserial = file\nlistening_ip = 10.0.0.1/8\n",
            Path::new("f.conf"),
        )
        .unwrap();
        let mut b = builder();
        b.apply_options(&entries).unwrap();
        b.apply_overrides(&Overrides {
            port: Some(9000),
            serial: Some("cli".to_string()),
            listen: vec!["192.168.1.5".to_string()],
            ..Default::default()
        })
        .unwrap();
        let config = b.build().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.notify_interval, Duration::from_secs(60));
        assert_eq!(config.identity.serial, "cli");
        assert_eq!(config.lan_addrs.len(), 2);
        assert_eq!(config.primary_addr().to_string(), "10.0.0.1");
    }

    #[test]
    fn addresses_are_capped_and_deduplicated() {
        let mut b = builder();
        assert!(b.add_lan_addr("10.0.0.1"));
        assert!(!b.add_lan_addr("10.0.0.1/16"));
        assert!(b.add_lan_addr("10.0.0.2"));
        assert!(b.add_lan_addr("10.0.0.3"));
        assert!(b.add_lan_addr("10.0.0.4"));
        assert!(!b.add_lan_addr("10.0.0.5"));
        assert!(!b.add_lan_addr("garbage"));
        assert_eq!(b.lan_addrs.len(), MAX_LAN_ADDR);
    }

    #[test]
    fn inaccessible_media_dirs_are_dropped() {
        let media = TempDir::new().unwrap();
        let mut b = builder();
        b.add_lan_addr("10.0.0.1");
        b.add_media_dir(&format!("A,{}", media.path().display()));
        b.add_media_dir("/definitely/not/here");
        b.apply_overrides(&Overrides {
            port: Some(8200),
            ..Default::default()
        })
        .unwrap();
        let config = b.build().unwrap();
        assert_eq!(config.media_dirs.len(), 1);
        assert_eq!(config.media_dirs[0].filter, ContentFilter::Audio);
    }

    #[test]
    fn switches_follow_yes_or_nonzero() {
        assert!(parse_switch("yes"));
        assert!(parse_switch("1"));
        assert!(!parse_switch("no"));
        assert!(!parse_switch("0"));
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(MAX_NOTIFY_INTERVAL_SECS, true)]
    #[case(MAX_NOTIFY_INTERVAL_SECS + 1, false)]
    #[case(u64::MAX, false)]
    fn interval_must_be_within_bounds(#[case] secs: u64, #[case] accepted: bool) {
        let mut b = builder();
        b.add_lan_addr("10.0.0.1");
        b.apply_overrides(&Overrides {
            port: Some(8200),
            notify_interval: Some(secs),
            ..Default::default()
        })
        .unwrap();
        match b.build() {
            Ok(config) => {
                assert!(accepted, "{secs} should be rejected");
                assert_eq!(config.notify_interval, Duration::from_secs(secs));
            }
            Err(ConfigError::InvalidValue { key, value }) => {
                assert!(!accepted, "{secs} should be accepted");
                assert_eq!(key, "notify_interval");
                assert_eq!(value, secs.to_string());
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
