//! Catalog store: the persisted media index shared by the reactor, the rescan
//! worker and the live watch.
//!
//! Persists a [`CatalogFile`] JSON document at `<db_dir>/files.json`; derived
//! thumbnails live under `<db_dir>/art_cache/`. Writes use an atomic `.tmp` +
//! `chmod 0600` + rename.
//!
//! Every locked operation waits at most the busy timeout for the lock. The
//! mutation counter and the item count are atomics, so pollers never lock.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanmedia_core::MediaKind;

use crate::error::{io_err, CatalogError};

/// Schema version this build reads and writes.
pub const CATALOG_VERSION: u32 = 1;
pub const CATALOG_FILE: &str = "files.json";
pub const ART_CACHE_DIR: &str = "art_cache";
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const LOCK_RETRY: Duration = Duration::from_millis(5);

/// One catalogued media file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Result of [`Catalog::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

/// On-disk catalog payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    /// 0 until a schema has been created.
    #[serde(default)]
    user_version: u32,
    #[serde(default)]
    update_id: u32,
    #[serde(default)]
    items: BTreeMap<PathBuf, MediaItem>,
}

#[derive(Debug)]
struct State {
    doc: CatalogFile,
    dirty: bool,
}

/// Handle to the catalog in one database directory.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    busy_timeout: Duration,
    state: Mutex<Option<State>>,
    changes: AtomicU64,
    items: AtomicUsize,
}

/// Path to the catalog document inside `db_dir`.
pub fn catalog_path_at(db_dir: &Path) -> PathBuf {
    db_dir.join(CATALOG_FILE)
}

/// Path to the derived-artwork cache inside `db_dir`.
pub fn art_cache_at(db_dir: &Path) -> PathBuf {
    db_dir.join(ART_CACHE_DIR)
}

impl Catalog {
    /// Open the catalog in `db_dir`. A missing document opens as an empty
    /// catalog with schema version 0; nothing is written until a flush.
    pub fn open(db_dir: &Path) -> Result<Self, CatalogError> {
        let path = catalog_path_at(db_dir);
        let doc = read_document(&path)?.unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            version = doc.user_version,
            items = doc.items.len(),
            "catalog opened",
        );
        Ok(Self {
            items: AtomicUsize::new(doc.items.len()),
            changes: AtomicU64::new(0),
            state: Mutex::new(Some(State { doc, dirty: false })),
            busy_timeout: BUSY_TIMEOUT,
            path,
        })
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted schema version (0 for a catalog without schema).
    pub fn schema_version(&self) -> Result<u32, CatalogError> {
        self.with_state(|state| state.doc.user_version)
    }

    /// Stamp the current schema version onto an empty catalog and persist it.
    pub fn create_schema(&self) -> Result<(), CatalogError> {
        self.with_state(|state| {
            state.doc.user_version = CATALOG_VERSION;
            state.dirty = true;
            self.persist(state)
        })?
    }

    /// Cumulative count of item inserts, updates and removals since open.
    pub fn total_changes(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }

    pub fn item_count(&self) -> usize {
        self.items.load(Ordering::Acquire)
    }

    pub fn upsert(&self, item: MediaItem) -> Result<Upsert, CatalogError> {
        self.with_state(|state| {
            let outcome = match state.doc.items.get(&item.path) {
                Some(existing) if *existing == item => return Upsert::Unchanged,
                Some(_) => Upsert::Updated,
                None => Upsert::Inserted,
            };
            state.doc.items.insert(item.path.clone(), item);
            state.dirty = true;
            self.record_changes(state, 1);
            outcome
        })
    }

    /// Remove `path` and every item beneath it. Returns the number removed.
    pub fn remove(&self, path: &Path) -> Result<usize, CatalogError> {
        self.with_state(|state| {
            let before = state.doc.items.len();
            state
                .doc
                .items
                .retain(|item_path, _| !item_path.starts_with(path));
            let removed = before - state.doc.items.len();
            if removed > 0 {
                state.dirty = true;
                self.record_changes(state, removed as u64);
            }
            removed
        })
    }

    pub fn get(&self, path: &Path) -> Result<Option<MediaItem>, CatalogError> {
        self.with_state(|state| state.doc.items.get(path).cloned())
    }

    pub fn items(&self) -> Result<Vec<MediaItem>, CatalogError> {
        self.with_state(|state| state.doc.items.values().cloned().collect())
    }

    /// The persisted revision id.
    pub fn update_id(&self) -> Result<u32, CatalogError> {
        self.with_state(|state| state.doc.update_id)
    }

    pub fn set_update_id(&self, update_id: u32) -> Result<(), CatalogError> {
        self.with_state(|state| {
            if state.doc.update_id != update_id {
                state.doc.update_id = update_id;
                state.dirty = true;
            }
        })
    }

    /// Write pending changes to disk.
    pub fn flush(&self) -> Result<(), CatalogError> {
        self.with_state(|state| {
            if state.dirty {
                self.persist(state)?;
            }
            Ok(())
        })?
    }

    /// Merge the on-disk document into memory. Items that differ from the
    /// in-memory copy count as mutations. Returns the number merged.
    pub fn reload(&self) -> Result<usize, CatalogError> {
        let Some(disk) = read_document(&self.path)? else {
            return Ok(0);
        };
        self.with_state(|state| {
            state.doc.user_version = state.doc.user_version.max(disk.user_version);
            state.doc.update_id = state.doc.update_id.max(disk.update_id);
            let mut merged = 0usize;
            for (path, item) in disk.items {
                if state.doc.items.get(&path) != Some(&item) {
                    state.doc.items.insert(path, item);
                    merged += 1;
                }
            }
            if merged > 0 {
                self.record_changes(state, merged as u64);
            }
            merged
        })
    }

    /// Flush and release the in-memory document. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), CatalogError> {
        let mut guard = self.lock()?;
        let Some(mut state) = guard.take() else {
            return Ok(());
        };
        if state.dirty {
            self.persist(&mut state)?;
        }
        tracing::debug!(path = %self.path.display(), "catalog closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|guard| guard.is_some()).unwrap_or(true)
    }

    /// Delete the catalog document and the artwork cache in `db_dir`.
    /// Missing files are not an error.
    pub fn discard_at(db_dir: &Path) -> Result<(), CatalogError> {
        let path = catalog_path_at(db_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }
        let art = art_cache_at(db_dir);
        match std::fs::remove_dir_all(&art) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&art, e)),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> Result<R, CatalogError> {
        let mut guard = self.lock()?;
        match guard.as_mut() {
            Some(state) => Ok(f(state)),
            None => Err(CatalogError::Closed),
        }
    }

    /// Acquire the state lock, retrying until the busy timeout elapses.
    fn lock(&self) -> Result<MutexGuard<'_, Option<State>>, CatalogError> {
        let deadline = Instant::now() + self.busy_timeout;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(CatalogError::Busy(self.busy_timeout));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
            }
        }
    }

    /// Write the document, never lowering an `update_id` that another
    /// handle on the same file persisted in the meantime.
    fn persist(&self, state: &mut State) -> Result<(), CatalogError> {
        match read_document(&self.path) {
            Ok(Some(disk)) => {
                state.doc.update_id = state.doc.update_id.max(disk.update_id);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "overwriting unreadable catalog document");
            }
        }
        write_document(&self.path, &state.doc)?;
        state.dirty = false;
        Ok(())
    }

    fn record_changes(&self, state: &State, count: u64) {
        self.changes.fetch_add(count, Ordering::AcqRel);
        self.items.store(state.doc.items.len(), Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Document I/O
// ---------------------------------------------------------------------------

fn read_document(path: &Path) -> Result<Option<CatalogFile>, CatalogError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize → `.json.tmp` sibling → `chmod 0600` → `rename`.
fn write_document(path: &Path, doc: &CatalogFile) -> Result<(), CatalogError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CatalogError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CatalogError> {
    Ok(())
}
