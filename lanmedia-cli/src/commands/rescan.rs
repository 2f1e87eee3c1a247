//! `lanmedia rescan`: the child side of the process-backed rescan.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use lanmedia_catalog::{rescan_all, Catalog, CATALOG_VERSION};
use lanmedia_core::MediaDir;

#[derive(Args, Debug)]
pub struct RescanArgs {
    #[arg(long, value_name = "DIR")]
    pub db_dir: PathBuf,

    /// Media directory, `[A|V|P,]/path` (repeatable).
    #[arg(long = "media-dir", value_name = "DIR")]
    pub media_dirs: Vec<MediaDir>,
}

impl RescanArgs {
    pub fn run(self) -> Result<()> {
        lanmedia_daemon::logging::init_stderr_tracing("info");
        std::fs::create_dir_all(&self.db_dir)
            .with_context(|| format!("create {}", self.db_dir.display()))?;
        let catalog = Catalog::open(&self.db_dir).context("failed to open catalog")?;
        if catalog.schema_version()? != CATALOG_VERSION {
            catalog
                .create_schema()
                .context("failed to create catalog schema")?;
        }
        let summary = rescan_all(&catalog, &self.media_dirs).context("rescan failed")?;
        catalog.close().context("failed to close catalog")?;
        tracing::info!(
            files = summary.files,
            added = summary.added,
            updated = summary.updated,
            "rescan finished",
        );
        Ok(())
    }
}
