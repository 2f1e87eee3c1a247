use std::path::Path;
use std::time::Duration;

use lanmedia_core::{DeviceIdentity, LanAddr, RescanMode, RuntimeConfig, UptimeSource};

/// Loopback configuration with every writable path under `scratch`.
pub(crate) fn runtime_config(scratch: &Path) -> RuntimeConfig {
    RuntimeConfig {
        port: 8200,
        notify_interval: Duration::from_secs(30),
        lan_addrs: vec![LanAddr::new("127.0.0.1".parse().unwrap(), 8)],
        presentation_url: "http://127.0.0.1/".to_string(),
        identity: DeviceIdentity {
            friendly_name: "Den & Co".to_string(),
            serial: "12345678".to_string(),
            model_number: "1".to_string(),
            uuid: "uuid:4d696e69-444c-164e-9d41-001122334455".to_string(),
        },
        media_dirs: Vec::new(),
        inotify: false,
        uptime: UptimeSource::Daemon,
        rescan_mode: RescanMode::Thread,
        force_rescan: false,
        db_dir: scratch.join("db"),
        log_dir: scratch.join("log"),
        pid_file: scratch.join("run").join("lanmedia.pid"),
        debug: true,
    }
}
