//! lanmedia: local-network media server daemon.
//!
//! # Usage
//!
//! ```text
//! lanmedia serve -p <port> [-a <addr[/bits]>]... [--media-dir <[A|V|P,]/path>]... [-f <file>] [-d]
//! lanmedia rescan --db-dir <dir> --media-dir <dir>...      (internal)
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{rescan::RescanArgs, serve::ServeArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "lanmedia",
    version,
    about = "Share a media library with UPnP/DLNA clients on the local network",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the media server in the foreground until SIGTERM or SIGINT.
    Serve(ServeArgs),

    /// Scan media directories into a catalog, then exit.
    #[command(hide = true)]
    Rescan(RescanArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Usage errors share the fatal-startup exit status; help and
        // version output keep clap's own.
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            std::process::exit(1);
        }
        Err(err) => err.exit(),
    };
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Rescan(args) => args.run(),
    }
}
