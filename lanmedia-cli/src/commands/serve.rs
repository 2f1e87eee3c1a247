//! `lanmedia serve`: load the configuration and run the daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use lanmedia_core::config;
use lanmedia_core::{Overrides, RescanMode};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Options file [default: /etc/lanmedia.conf].
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to advertise, `a.b.c.d[/bits]` (repeatable, at most 4).
    #[arg(short = 'a', long = "listen", value_name = "ADDR")]
    pub listen: Vec<String>,

    /// HTTP port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seconds between discovery announcements.
    #[arg(short = 't', long, value_name = "SECS")]
    pub notify_interval: Option<u64>,

    #[arg(short, long)]
    pub serial: Option<String>,

    #[arg(short, long)]
    pub model_number: Option<String>,

    #[arg(long)]
    pub friendly_name: Option<String>,

    #[arg(short = 'w', long, value_name = "URL")]
    pub presentation_url: Option<String>,

    /// Report system uptime instead of daemon uptime.
    #[arg(short = 'U', long)]
    pub system_uptime: bool,

    #[arg(short = 'P', long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Log at debug level to stderr.
    #[arg(short, long)]
    pub debug: bool,

    /// Rebuild the catalog even when its schema is current.
    #[arg(short = 'R', long)]
    pub force_rescan: bool,

    /// Media directory, `[A|V|P,]/path` (repeatable).
    #[arg(long = "media-dir", value_name = "DIR")]
    pub media_dirs: Vec<String>,

    #[arg(long, value_name = "DIR")]
    pub db_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// How a full rescan runs: `thread` or `process`.
    #[arg(long, value_name = "MODE")]
    pub rescan_mode: Option<RescanMode>,

    /// Disable the live filesystem watch.
    #[arg(long)]
    pub no_inotify: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let overrides = self.into_overrides();
        let config = config::load(&overrides).context("invalid configuration")?;
        lanmedia_daemon::start_blocking(config).context("daemon exited with error")?;
        Ok(())
    }

    fn into_overrides(self) -> Overrides {
        Overrides {
            config_file: self.config,
            listen: self.listen,
            port: self.port,
            notify_interval: self.notify_interval,
            serial: self.serial,
            model_number: self.model_number,
            friendly_name: self.friendly_name,
            presentation_url: self.presentation_url,
            system_uptime: self.system_uptime,
            pid_file: self.pid_file,
            debug: self.debug,
            force_rescan: self.force_rescan,
            media_dirs: self.media_dirs,
            db_dir: self.db_dir,
            log_dir: self.log_dir,
            rescan_mode: self.rescan_mode,
            no_inotify: self.no_inotify,
        }
    }
}
