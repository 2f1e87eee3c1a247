//! Live filesystem watch: keeps the catalog in step with the media
//! directories between full scans.
//!
//! One `notify` watcher is attached recursively to every media directory and
//! drained on a dedicated thread. Created or modified paths are upserted (new
//! directories are scanned); paths that no longer exist are removed together
//! with everything beneath them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use lanmedia_core::{ContentFilter, MediaDir};

use crate::error::{io_err, CatalogError};
use crate::scanner::{self, is_hidden};
use crate::store::Catalog;

/// How often the watch thread re-checks its stop flag while idle.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Running watch thread. Stop it before closing the catalog.
#[derive(Debug)]
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Signal the thread and join it. Calling this more than once is a no-op.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            tracing::error!("filesystem watch thread panicked");
        } else {
            tracing::debug!("filesystem watch stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Attach watches to every directory in `dirs` and start the watch thread.
///
/// Failing to create the watcher, attach a directory, or spawn the thread is
/// returned to the caller.
pub fn spawn(catalog: Arc<Catalog>, dirs: Vec<MediaDir>) -> Result<WatchHandle, CatalogError> {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(event_tx)?;
    for dir in &dirs {
        watcher.watch(&dir.path, RecursiveMode::Recursive)?;
        tracing::debug!(path = %dir.path.display(), "watching media directory");
    }

    let watched = dirs.len();
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("lanmedia-watch".to_string())
            .spawn(move || {
                // Keep the watcher alive for as long as the thread runs.
                let _watcher = watcher;
                watch_loop(&catalog, &dirs, &event_rx, &stop);
            })
            .map_err(|e| io_err("lanmedia-watch thread", e))?
    };

    tracing::info!(directories = watched, "filesystem watch started");
    Ok(WatchHandle {
        stop,
        thread: Some(thread),
    })
}

fn watch_loop(
    catalog: &Catalog,
    dirs: &[MediaDir],
    events: &mpsc::Receiver<notify::Result<Event>>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        let event = match events.recv_timeout(STOP_POLL) {
            Ok(Ok(event)) => event,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "watcher event error");
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !is_relevant_event_kind(&event.kind) {
            continue;
        }
        for path in &event.paths {
            if let Err(err) = apply_path(catalog, dirs, path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to apply filesystem change");
            }
        }
        if let Err(err) = catalog.flush() {
            tracing::warn!(error = %err, "failed to flush catalog after filesystem change");
        }
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// The content filter of the media directory containing `path`.
fn filter_for(dirs: &[MediaDir], path: &Path) -> Option<ContentFilter> {
    dirs.iter()
        .filter(|dir| path.starts_with(&dir.path))
        .max_by_key(|dir| dir.path.components().count())
        .map(|dir| dir.filter)
}

/// Bring the catalog entry for one changed path up to date.
pub(crate) fn apply_path(
    catalog: &Catalog,
    dirs: &[MediaDir],
    path: &Path,
) -> Result<(), CatalogError> {
    let Some(filter) = filter_for(dirs, path) else {
        return Ok(());
    };
    if path
        .ancestors()
        .take_while(|ancestor| dirs.iter().all(|dir| dir.path.as_path() != *ancestor))
        .any(is_hidden)
    {
        return Ok(());
    }

    if !path.exists() {
        let removed = catalog.remove(path)?;
        if removed > 0 {
            tracing::debug!(path = %path.display(), removed, "removed from catalog");
        }
        return Ok(());
    }
    if path.is_dir() {
        let summary = scanner::scan_tree(catalog, path, filter)?;
        tracing::debug!(path = %path.display(), added = summary.added, "scanned new directory");
        return Ok(());
    }
    match scanner::media_item(path, filter)? {
        Some(item) => {
            catalog.upsert(item)?;
        }
        None => {
            catalog.remove(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn media_dir(path: &Path, filter: ContentFilter) -> MediaDir {
        MediaDir {
            path: path.to_path_buf(),
            filter,
        }
    }

    #[test]
    fn nested_directory_filter_wins() {
        let dirs = vec![
            media_dir(Path::new("/m"), ContentFilter::All),
            media_dir(Path::new("/m/music"), ContentFilter::Audio),
        ];
        assert_eq!(
            filter_for(&dirs, Path::new("/m/music/a.mp3")),
            Some(ContentFilter::Audio)
        );
        assert_eq!(filter_for(&dirs, Path::new("/m/x.jpg")), Some(ContentFilter::All));
        assert_eq!(filter_for(&dirs, Path::new("/other/x.jpg")), None);
    }

    #[test]
    fn apply_path_upserts_and_removes() {
        let media = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let catalog = Catalog::open(db.path()).unwrap();
        let dirs = vec![media_dir(media.path(), ContentFilter::All)];

        let song = media.path().join("song.mp3");
        std::fs::write(&song, b"ID3").unwrap();
        apply_path(&catalog, &dirs, &song).unwrap();
        assert!(catalog.get(&song).unwrap().is_some());

        std::fs::remove_file(&song).unwrap();
        apply_path(&catalog, &dirs, &song).unwrap();
        assert!(catalog.get(&song).unwrap().is_none());
        assert_eq!(catalog.total_changes(), 2);
    }

    #[test]
    fn apply_path_scans_new_directories_and_skips_hidden() {
        let media = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let catalog = Catalog::open(db.path()).unwrap();
        let dirs = vec![media_dir(media.path(), ContentFilter::Images)];

        let album = media.path().join("album");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("a.jpg"), b"x").unwrap();
        std::fs::write(album.join("b.mp3"), b"x").unwrap();
        apply_path(&catalog, &dirs, &album).unwrap();
        assert_eq!(catalog.item_count(), 1);

        let hidden = media.path().join(".cache");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("c.jpg"), b"x").unwrap();
        apply_path(&catalog, &dirs, &hidden.join("c.jpg")).unwrap();
        assert_eq!(catalog.item_count(), 1);
    }

    #[test]
    fn spawned_watch_runs_until_stopped() {
        let media = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::open(db.path()).unwrap());
        let dirs = vec![media_dir(media.path(), ContentFilter::All)];

        let mut handle = spawn(catalog, dirs).unwrap();
        assert!(handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
        handle.stop();
    }
}
