//! Options-file loading through `config::load`, including the command-line merge.

use assert_fs::prelude::*;
use lanmedia_core::{
    config::{self, Overrides},
    ConfigError, ContentFilter, RescanMode, UptimeSource,
};
use predicates::prelude::*;
use std::time::Duration;

fn overrides_for(file: &std::path::Path) -> Overrides {
    Overrides {
        config_file: Some(file.to_path_buf()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// 1. Full file
// ---------------------------------------------------------------------------

#[test]
fn load_reads_every_option() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let music = dir.child("music");
    music.create_dir_all().expect("mkdir");
    let conf = dir.child("lanmedia.conf");
    conf.write_str(&format!(
        "# lanmedia\n\
         listening_ip = 192.168.10.4/16\n\
         port = 8200\n\
         notify_interval = 45\n\
         system_uptime = yes\n\
         serial = 0042\n\
         model_number = 7\n\
         friendly_name = Shelf\n\
         media_dir = A,{}\n\
         inotify = no\n\
         db_dir = {}\n\
         log_dir = {}\n\
         rescan_mode = process\n",
        music.path().display(),
        dir.path().join("db").display(),
        dir.path().join("log").display(),
    ))
    .expect("write");

    let config = config::load(&overrides_for(conf.path())).expect("load");
    assert_eq!(config.port, 8200);
    assert_eq!(config.notify_interval, Duration::from_secs(45));
    assert_eq!(config.lan_addrs[0].to_string(), "192.168.10.4/16");
    assert_eq!(config.presentation_url, "http://192.168.10.4/");
    assert_eq!(config.uptime, UptimeSource::System);
    assert_eq!(config.identity.serial, "0042");
    assert_eq!(config.identity.model_number, "7");
    assert_eq!(config.identity.friendly_name, "Shelf");
    assert_eq!(config.media_dirs.len(), 1);
    assert_eq!(config.media_dirs[0].filter, ContentFilter::Audio);
    assert!(!config.inotify);
    assert_eq!(config.rescan_mode, RescanMode::Process);
    assert!(config.db_dir.ends_with("db"));
    assert!(config.log_dir.ends_with("log"));
    assert!(config.identity.uuid.starts_with("uuid:4d696e69-444c-164e-9d41-"));
}

#[test]
fn command_line_has_the_final_say() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let conf = dir.child("lanmedia.conf");
    conf.write_str("listening_ip = 10.1.1.1\nport = 8200\nfriendly_name = File\n")
        .expect("write");

    let mut overrides = overrides_for(conf.path());
    overrides.port = Some(9100);
    overrides.friendly_name = Some("Cli".to_string());
    overrides.no_inotify = true;
    overrides.force_rescan = true;
    overrides.debug = true;

    let config = config::load(&overrides).expect("load");
    assert_eq!(config.port, 9100);
    assert_eq!(config.identity.friendly_name, "Cli");
    assert!(!config.inotify);
    assert!(config.force_rescan);
    assert!(config.debug);
}

// ---------------------------------------------------------------------------
// 2. Errors
// ---------------------------------------------------------------------------

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let missing = dir.child("absent.conf");
    let err = config::load(&overrides_for(missing.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(predicate::str::contains("absent.conf").eval(&err.to_string()));
}

#[test]
fn malformed_line_reports_file_and_line() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let conf = dir.child("broken.conf");
    conf.write_str("port = 8200\nthis line has no separator\n")
        .expect("write");
    let err = config::load(&overrides_for(conf.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Syntax { line: 2, .. }), "got: {err}");
    assert!(err.to_string().contains("broken.conf:2"));
}

#[test]
fn missing_port_is_fatal() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let conf = dir.child("noport.conf");
    conf.write_str("listening_ip = 10.1.1.1\n").expect("write");
    let err = config::load(&overrides_for(conf.path())).unwrap_err();
    assert!(matches!(err, ConfigError::NoPort), "got: {err}");
}

#[test]
fn non_numeric_port_names_the_option() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let conf = dir.child("badport.conf");
    conf.write_str("port = eighty\n").expect("write");
    let err = config::load(&overrides_for(conf.path())).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got: {err}");
    assert!(err.to_string().contains("'port'"));
}
