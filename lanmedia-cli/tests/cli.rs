use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use lanmedia_catalog::{Catalog, CATALOG_VERSION};

fn lanmedia_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("lanmedia"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn scratch_args(cmd: &mut Command, scratch: &Path) {
    cmd.arg("--db-dir")
        .arg(scratch.join("db"))
        .arg("--log-dir")
        .arg(scratch.join("log"))
        .arg("-P")
        .arg(scratch.join("lanmedia.pid"))
        .arg("-f")
        .arg(scratch.join("lanmedia.conf"));
}

#[test]
fn help_lists_serve_but_not_rescan() {
    lanmedia_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("serve"))
        .stdout(contains("rescan").not());
}

#[test]
fn serve_help_documents_configuration_flags() {
    lanmedia_cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(contains("--notify-interval"))
        .stdout(contains("--media-dir"))
        .stdout(contains("--rescan-mode"));
}

#[test]
fn serve_without_port_exits_with_status_one() {
    let scratch = TempDir::new().unwrap();
    fs::write(scratch.path().join("lanmedia.conf"), "friendly_name = den\n").unwrap();

    let mut cmd = lanmedia_cmd();
    cmd.args(["serve", "-a", "127.0.0.1/8", "-d"]);
    scratch_args(&mut cmd, scratch.path());
    cmd.assert()
        .code(1)
        .stderr(contains("invalid configuration"));
    assert!(!scratch.path().join("lanmedia.pid").exists());
}

#[test]
fn serve_with_missing_explicit_options_file_fails() {
    let scratch = TempDir::new().unwrap();
    let mut cmd = lanmedia_cmd();
    cmd.args(["serve", "-p", "8200", "-a", "127.0.0.1"]);
    scratch_args(&mut cmd, scratch.path());
    cmd.assert().code(1).stderr(contains("lanmedia.conf"));
}

#[test]
fn serve_rejects_unknown_rescan_mode() {
    lanmedia_cmd()
        .args(["serve", "-p", "8200", "--rescan-mode", "later"])
        .assert()
        .code(1)
        .stderr(contains("rescan_mode"));
}

#[test]
fn usage_errors_exit_with_status_one() {
    lanmedia_cmd()
        .args(["serve", "--bogus"])
        .assert()
        .code(1)
        .stderr(contains("--bogus"));
    lanmedia_cmd()
        .args(["serve", "-p", "notanumber"])
        .assert()
        .code(1)
        .stderr(contains("notanumber"));
}

#[test]
fn version_exits_cleanly() {
    lanmedia_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn rescan_fills_a_fresh_catalog() {
    let db = TempDir::new().unwrap();
    let media = TempDir::new().unwrap();
    fs::write(media.path().join("one.mp3"), b"ID3").unwrap();
    fs::write(media.path().join("two.png"), b"png").unwrap();
    fs::write(media.path().join("three.txt"), b"txt").unwrap();

    lanmedia_cmd()
        .arg("rescan")
        .arg("--db-dir")
        .arg(db.path())
        .arg("--media-dir")
        .arg(media.path())
        .assert()
        .success();

    let catalog = Catalog::open(db.path()).unwrap();
    assert_eq!(catalog.schema_version().unwrap(), CATALOG_VERSION);
    assert_eq!(catalog.item_count(), 2);
}

#[test]
fn rescan_honours_content_filter() {
    let db = TempDir::new().unwrap();
    let media = TempDir::new().unwrap();
    fs::write(media.path().join("one.mp3"), b"ID3").unwrap();
    fs::write(media.path().join("two.png"), b"png").unwrap();

    lanmedia_cmd()
        .arg("rescan")
        .arg("--db-dir")
        .arg(db.path())
        .arg("--media-dir")
        .arg(format!("P,{}", media.path().display()))
        .assert()
        .success();

    assert_eq!(Catalog::open(db.path()).unwrap().item_count(), 1);
}
