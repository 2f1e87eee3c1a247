//! Pid file: written before the catalog is opened, removed at shutdown.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    removed: bool,
}

impl PidFile {
    /// Refuse to start when the pid file names another live process;
    /// otherwise (re)write it with our pid. A stale file is replaced.
    pub fn acquire(path: &Path) -> Result<Self, DaemonError> {
        let own = std::process::id();
        match std::fs::read_to_string(path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if pid != own && process_alive(pid) => {
                    return Err(DaemonError::AlreadyRunning {
                        pid,
                        path: path.to_path_buf(),
                    });
                }
                _ => tracing::warn!(path = %path.display(), "replacing stale pid file"),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(path, err)),
        }

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        std::fs::write(path, format!("{own}\n")).map_err(|e| io_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. Only the first call touches the filesystem.
    pub fn remove(&mut self) -> std::io::Result<bool> {
        if self.removed {
            return Ok(false);
        }
        self.removed = true;
        std::fs::remove_file(&self.path)?;
        Ok(true)
    }
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_own_pid_and_removes_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run").join("lanmedia.pid");
        let mut pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );
        assert!(pid_file.remove().unwrap());
        assert!(!pid_file.remove().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn stale_pid_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lanmedia.pid");
        std::fs::write(&path, "not-a-pid\n").unwrap();
        PidFile::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_process_blocks_startup() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lanmedia.pid");
        // pid 1 always exists on Linux.
        std::fs::write(&path, "1\n").unwrap();
        let err = PidFile::acquire(&path).unwrap_err();
        assert!(matches!(err, DaemonError::AlreadyRunning { pid: 1, .. }), "got: {err}");
    }
}
