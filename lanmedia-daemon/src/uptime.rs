//! Start-time bookkeeping for uptime reporting.
//!
//! Wall-clock time is used here and nowhere else; scheduling runs on the
//! monotonic clock.

use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use lanmedia_core::UptimeSource;

pub const PROC_UPTIME: &str = "/proc/uptime";

/// The instant uptime is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupClock {
    started_at: DateTime<Utc>,
}

impl StartupClock {
    pub fn new(source: UptimeSource) -> Self {
        Self::with_uptime_file(source, Path::new(PROC_UPTIME))
    }

    /// With [`UptimeSource::System`], the start time is moved back by the
    /// system uptime read from `uptime_file`; a read failure falls back to
    /// daemon uptime.
    pub fn with_uptime_file(source: UptimeSource, uptime_file: &Path) -> Self {
        let now = Utc::now();
        let started_at = match source {
            UptimeSource::Daemon => now,
            UptimeSource::System => match read_system_uptime(uptime_file) {
                Some(secs) => {
                    tracing::info!(seconds = secs, "system uptime");
                    now - ChronoDuration::seconds(secs)
                }
                None => {
                    tracing::error!(
                        path = %uptime_file.display(),
                        "cannot read system uptime, reporting daemon uptime",
                    );
                    now
                }
            },
        };
        Self { started_at }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

fn read_system_uptime(path: &Path) -> Option<i64> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_proc_uptime(&contents)
}

/// Whole seconds from the first field of `/proc/uptime` (`"12345.67 54321.00"`).
pub fn parse_proc_uptime(contents: &str) -> Option<i64> {
    let first = contents.split_whitespace().next()?;
    let whole = first.split('.').next()?;
    whole.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_proc_uptime_format() {
        assert_eq!(parse_proc_uptime("350735.47 234388.90\n"), Some(350735));
        assert_eq!(parse_proc_uptime("12 1"), Some(12));
        assert_eq!(parse_proc_uptime(""), None);
        assert_eq!(parse_proc_uptime("abc 1"), None);
    }

    #[test]
    fn system_source_moves_start_back() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("uptime");
        std::fs::write(&file, "3600.50 100.00\n").unwrap();
        let clock = StartupClock::with_uptime_file(UptimeSource::System, &file);
        assert!(clock.uptime_secs() >= 3600);
    }

    #[test]
    fn unreadable_uptime_falls_back_to_daemon() {
        let clock =
            StartupClock::with_uptime_file(UptimeSource::System, Path::new("/no/such/uptime"));
        assert!(clock.uptime_secs() < 5);
    }
}
