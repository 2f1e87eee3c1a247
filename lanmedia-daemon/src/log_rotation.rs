//! Size-based rotation of the daemon log, run once before logging starts.
//!
//! `lanmedia.log` → `lanmedia.log.1` → … → `lanmedia.log.5`; the oldest copy
//! is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once the live log reaches 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Numbered backups kept after rotation.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` when it is at least `max_bytes` long. Returns whether a
/// rotation happened; a missing log is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    remove_if_present(&numbered_path(log_path, max_files))?;
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// Rotate `<log_dir>/lanmedia.log`. Failures are reported on stderr, since
/// the subscriber is not installed yet, and never stop startup.
pub fn rotate_daemon_log(log_dir: &Path) -> bool {
    let path = crate::paths::log_path(log_dir);
    match rotate_if_needed(&path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(rotated) => rotated,
        Err(err) => {
            eprintln!("lanmedia: log rotation failed for {}: {err}", path.display());
            false
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// `lanmedia.log` → `lanmedia.log.<n>`.
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::LOG_FILE);
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_log(path: &Path, bytes: usize) {
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn small_log_stays_put() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("lanmedia.log");
        write_log(&log, 1024);
        assert!(!rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn oversized_log_moves_to_first_backup() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("lanmedia.log");
        write_log(&log, 64);
        assert!(rotate_if_needed(&log, 32, MAX_ROTATED_FILES).unwrap());
        assert!(!log.exists(), "the subscriber reopens the live log");
        assert_eq!(fs::metadata(numbered_path(&log, 1)).unwrap().len(), 64);
    }

    #[test]
    fn backups_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("lanmedia.log");
        for n in 1..=MAX_ROTATED_FILES {
            fs::write(numbered_path(&log, n), format!("backup-{n}")).unwrap();
        }
        write_log(&log, 64);
        assert!(rotate_if_needed(&log, 32, MAX_ROTATED_FILES).unwrap());
        assert!(numbered_path(&log, MAX_ROTATED_FILES).exists());
        assert!(!numbered_path(&log, MAX_ROTATED_FILES + 1).exists());
        assert_eq!(
            fs::read_to_string(numbered_path(&log, MAX_ROTATED_FILES)).unwrap(),
            format!("backup-{}", MAX_ROTATED_FILES - 1)
        );
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!rotate_daemon_log(dir.path()));
    }
}
