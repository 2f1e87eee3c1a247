//! Directory scanner: walks media directories breadth-first into the catalog.

use std::collections::VecDeque;
use std::path::Path;

use chrono::{DateTime, Utc};

use lanmedia_core::{ContentFilter, MediaDir, MediaKind};

use crate::error::{io_err, CatalogError};
use crate::store::{Catalog, MediaItem, Upsert};

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "wma", "m4a", "aac", "ogg", "oga", "opus", "pcm", "aif", "aiff", "ape",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mpg", "mpeg", "avi", "divx", "asf", "wmv", "mp4", "m4v", "mts", "m2ts", "ts", "vob", "mkv",
    "mov", "flv", "3gp", "webm",
];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

/// Counters from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub directories: usize,
    pub files: usize,
    pub added: usize,
    pub updated: usize,
}

impl ScanSummary {
    fn absorb(&mut self, other: ScanSummary) {
        self.directories += other.directories;
        self.files += other.files;
        self.added += other.added;
        self.updated += other.updated;
    }
}

/// Media kind for `path`, by extension.
pub fn classify(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let ext = ext.as_str();
    if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Build the catalog entry for a regular file, if the filter accepts it.
pub fn media_item(path: &Path, filter: ContentFilter) -> Result<Option<MediaItem>, CatalogError> {
    let Some(kind) = classify(path).filter(|kind| filter.accepts(*kind)) else {
        return Ok(None);
    };
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    if !meta.is_file() {
        return Ok(None);
    }
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Ok(Some(MediaItem {
        path: path.to_path_buf(),
        kind,
        size: meta.len(),
        modified,
    }))
}

/// Scan one configured media directory.
pub fn scan_directory(catalog: &Catalog, dir: &MediaDir) -> Result<ScanSummary, CatalogError> {
    scan_tree(catalog, &dir.path, dir.filter)
}

/// Scan every directory below `root` (inclusive), upserting matching files.
///
/// Hidden entries and symlinked directories are skipped. Unreadable
/// subdirectories are logged and skipped.
pub fn scan_tree(
    catalog: &Catalog,
    root: &Path,
    filter: ContentFilter,
) -> Result<ScanSummary, CatalogError> {
    let mut summary = ScanSummary::default();
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if dir.as_path() == root => return Err(io_err(&dir, err)),
            Err(err) => {
                tracing::warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        summary.directories += 1;

        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "cannot stat entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                queue.push_back(path);
                continue;
            }
            if file_type.is_symlink() && path.is_dir() {
                continue;
            }
            let item = match media_item(&path, filter) {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping file");
                    continue;
                }
            };
            summary.files += 1;
            match catalog.upsert(item)? {
                Upsert::Inserted => summary.added += 1,
                Upsert::Updated => summary.updated += 1,
                Upsert::Unchanged => {}
            }
        }
    }
    Ok(summary)
}

/// Scan every configured directory, flushing after each one.
pub fn rescan_all(catalog: &Catalog, dirs: &[MediaDir]) -> Result<ScanSummary, CatalogError> {
    let mut total = ScanSummary::default();
    for dir in dirs {
        tracing::info!(path = %dir.path.display(), filter = ?dir.filter, "scanning media directory");
        match scan_directory(catalog, dir) {
            Ok(summary) => total.absorb(summary),
            Err(CatalogError::Io { path, source }) => {
                tracing::warn!(path = %path.display(), error = %source, "media directory scan failed");
            }
            Err(err) => return Err(err),
        }
        catalog.flush()?;
    }
    tracing::info!(
        directories = total.directories,
        files = total.files,
        added = total.added,
        updated = total.updated,
        "media scan complete",
    );
    Ok(total)
}
