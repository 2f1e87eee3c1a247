//! Startup orchestration: reconcile the persisted catalog with the running
//! version, then start the background rescan and live watch.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lanmedia_catalog::{watch, Catalog, WatchHandle, CATALOG_VERSION};
use lanmedia_core::RuntimeConfig;

use crate::background::{BackgroundTask, RescanBackend};
use crate::error::{io_err, DaemonError};

/// The opened catalog and whether it was rebuilt from scratch.
#[derive(Debug)]
pub struct PreparedCatalog {
    pub catalog: Arc<Catalog>,
    pub rebuilt: bool,
}

/// Background work started alongside serving.
#[derive(Debug, Default)]
pub struct BackgroundWork {
    pub rescan: Option<BackgroundTask>,
    pub watch: Option<WatchHandle>,
}

/// Open the catalog; on a schema version mismatch (or a forced rescan) discard
/// it with its artwork cache and create a fresh schema.
pub fn prepare_catalog(config: &RuntimeConfig) -> Result<PreparedCatalog, DaemonError> {
    ensure_db_dir(&config.db_dir)?;
    let catalog = Catalog::open(&config.db_dir)?;
    let version = catalog.schema_version()?;

    if version == CATALOG_VERSION && !config.force_rescan {
        tracing::info!(
            version,
            items = catalog.item_count(),
            "catalog schema is current",
        );
        return Ok(PreparedCatalog {
            catalog: Arc::new(catalog),
            rebuilt: false,
        });
    }

    if version == CATALOG_VERSION {
        tracing::info!("rescan forced, rebuilding catalog");
    } else {
        tracing::warn!(
            found = version,
            expected = CATALOG_VERSION,
            "catalog schema version mismatch, rebuilding",
        );
    }
    catalog.close()?;
    Catalog::discard_at(&config.db_dir)?;
    let catalog = Catalog::open(&config.db_dir)?;
    catalog.create_schema()?;
    Ok(PreparedCatalog {
        catalog: Arc::new(catalog),
        rebuilt: true,
    })
}

/// Launch the full rescan after a rebuild and the live watch when enabled.
/// Neither is waited for.
pub fn start_background(
    config: &RuntimeConfig,
    prepared: &PreparedCatalog,
) -> Result<BackgroundWork, DaemonError> {
    let mut work = BackgroundWork::default();
    if prepared.rebuilt {
        let backend = RescanBackend::from_config(config)?;
        work.rescan = Some(BackgroundTask::spawn_rescan(
            backend,
            prepared.catalog.clone(),
            config.media_dirs.clone(),
        )?);
    }
    if config.inotify && !config.media_dirs.is_empty() {
        work.watch = Some(watch::spawn(
            prepared.catalog.clone(),
            config.media_dirs.clone(),
        )?);
    }
    Ok(work)
}

fn ensure_db_dir(dir: &Path) -> Result<(), DaemonError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::RescanOutcome;
    use crate::test_support::runtime_config;
    use lanmedia_catalog::MediaItem;
    use lanmedia_core::{ContentFilter, MediaDir, MediaKind};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn stale_catalog(db_dir: &Path) {
        fs::create_dir_all(db_dir).unwrap();
        let old = Catalog::open(db_dir).unwrap();
        old.upsert(MediaItem {
            path: "/gone/old.mp3".into(),
            kind: MediaKind::Audio,
            size: 3,
            modified: chrono::Utc::now(),
        })
        .unwrap();
        old.close().unwrap();
        fs::create_dir_all(lanmedia_catalog::store::art_cache_at(db_dir)).unwrap();
    }

    #[test]
    fn creates_private_db_dir_and_fresh_schema() {
        let scratch = TempDir::new().unwrap();
        let config = runtime_config(scratch.path());

        let prepared = prepare_catalog(&config).unwrap();
        assert!(prepared.rebuilt, "an empty catalog has version 0");
        assert_eq!(prepared.catalog.schema_version().unwrap(), CATALOG_VERSION);
        let mode = fs::metadata(&config.db_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn current_schema_is_kept() {
        let scratch = TempDir::new().unwrap();
        let config = runtime_config(scratch.path());
        prepare_catalog(&config).unwrap().catalog.close().unwrap();

        let again = prepare_catalog(&config).unwrap();
        assert!(!again.rebuilt);
    }

    #[test]
    fn forced_rescan_rebuilds_a_current_catalog() {
        let scratch = TempDir::new().unwrap();
        let mut config = runtime_config(scratch.path());
        prepare_catalog(&config).unwrap().catalog.close().unwrap();

        config.force_rescan = true;
        assert!(prepare_catalog(&config).unwrap().rebuilt);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mismatch_discards_and_rescans_everything() {
        let scratch = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        fs::write(media.path().join("song.flac"), b"fLaC").unwrap();
        fs::write(media.path().join("clip.mp4"), b"mp4").unwrap();

        let mut config = runtime_config(scratch.path());
        config.media_dirs = vec![MediaDir {
            path: media.path().to_path_buf(),
            filter: ContentFilter::All,
        }];
        stale_catalog(&config.db_dir);

        let prepared = prepare_catalog(&config).unwrap();
        assert!(prepared.rebuilt);
        assert_eq!(prepared.catalog.schema_version().unwrap(), CATALOG_VERSION);
        assert!(prepared
            .catalog
            .get(Path::new("/gone/old.mp3"))
            .unwrap()
            .is_none());
        assert!(!lanmedia_catalog::store::art_cache_at(&config.db_dir).exists());

        let work = start_background(&config, &prepared).unwrap();
        assert!(work.watch.is_none());
        let outcome = work.rescan.expect("rescan started").wait().await.unwrap();
        assert!(matches!(outcome, RescanOutcome::Scanned(s) if s.added == 2));
        assert_eq!(prepared.catalog.item_count(), 2);
    }

    #[test]
    fn watch_starts_only_when_enabled() {
        let scratch = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let mut config = runtime_config(scratch.path());
        config.media_dirs = vec![MediaDir {
            path: media.path().to_path_buf(),
            filter: ContentFilter::All,
        }];
        let prepared = prepare_catalog(&config).unwrap();
        let prepared = PreparedCatalog {
            catalog: prepared.catalog,
            rebuilt: false,
        };

        assert!(start_background(&config, &prepared).unwrap().watch.is_none());
        config.inotify = true;
        let mut work = start_background(&config, &prepared).unwrap();
        let mut watch = work.watch.take().expect("watch running");
        assert!(watch.is_running());
        watch.stop();
        assert!(!watch.is_running());
    }
}
