//! Library Store
//!
//! File-backed persistence for [`LibraryDocument`].
//!
//! Every operation is a full load-mutate-save cycle over `db.json`. The cycle
//! runs inside a critical section made of an in-process mutex and an exclusive
//! advisory lock on `db.json.lock`, so concurrent increments from threads or
//! from other processes sharing the data directory never lose updates.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use super::migrate::{decode_library, StoredLayout};
use super::{AnalyticsEvent, LibraryDocument, VideoRecord};
use crate::core::fs::{
    atomic_write_json_pretty, preserve_copy, quarantine_file, sibling_path,
    validate_path_id_component,
};
use crate::core::settings::{CorruptionPolicy, EngineSettings};
use crate::core::{CoreError, CoreResult};

/// Where the document returned by [`LibraryStore::load`] came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOrigin {
    /// No database existed; an empty one was written
    Initialized,
    /// Read as-is from the current layout
    Existing,
    /// Converted from the legacy list layout and written back
    Migrated,
    /// The database was unreadable and replaced by an empty one
    Recovered {
        /// Where the unreadable bytes were moved, if that succeeded
        quarantined: Option<PathBuf>,
        reason: String,
    },
}

/// A loaded document tagged with its origin
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedLibrary {
    pub document: LibraryDocument,
    pub origin: LoadOrigin,
}

/// Persistent clip metadata store
pub struct LibraryStore {
    db_path: PathBuf,
    policy: CorruptionPolicy,
    guard: Mutex<()>,
}

impl LibraryStore {
    /// Create a store backed by `db_path`
    pub fn new(db_path: impl Into<PathBuf>, policy: CorruptionPolicy) -> Self {
        Self {
            db_path: db_path.into(),
            policy,
            guard: Mutex::new(()),
        }
    }

    /// Create a store from engine settings
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.database_path(), settings.corruption_policy)
    }

    /// Path of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock_path(&self) -> PathBuf {
        sibling_path(&self.db_path, "lock")
    }

    /// Runs `op` while holding both the in-process and the on-disk lock.
    ///
    /// Loading may write (initialization, migration, recovery), so every
    /// operation takes the lock exclusively.
    fn with_lock<T>(&self, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        // The mutex guards no data, so a poisoned lock is still usable.
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| CoreError::StoreLockFailed(format!("open lock file: {e}")))?;

        fs2::FileExt::lock_exclusive(&lock_file)
            .map_err(|e| CoreError::StoreLockFailed(format!("exclusive lock: {e}")))?;

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock store lock file: {}", e);
        }

        result
    }

    // =========================================================================
    // Load / Save
    // =========================================================================

    /// Load the library, initializing, migrating or recovering as needed.
    pub fn load(&self) -> CoreResult<LoadedLibrary> {
        self.with_lock(|| self.load_unlocked())
    }

    /// Replace the persisted library with `document`.
    pub fn save(&self, document: &LibraryDocument) -> CoreResult<()> {
        self.with_lock(|| self.save_unlocked(document))
    }

    fn load_unlocked(&self) -> CoreResult<LoadedLibrary> {
        let bytes = match std::fs::read(&self.db_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let document = LibraryDocument::new();
                self.save_unlocked(&document)?;
                info!("Initialized empty library at {}", self.db_path.display());
                return Ok(LoadedLibrary {
                    document,
                    origin: LoadOrigin::Initialized,
                });
            }
            Err(e) => return Err(e.into()),
        };

        match decode_library(&bytes) {
            Ok(decoded) => {
                if decoded.repaired > 0 {
                    // The original bytes must survive the rewrite below.
                    let copy = preserve_copy(&self.db_path, "repaired")?;
                    warn!(
                        "Repaired {} library entries while loading {}, original kept at {}",
                        decoded.repaired,
                        self.db_path.display(),
                        copy.display()
                    );
                }

                let migrated = decoded.layout == StoredLayout::Legacy;
                if migrated || decoded.repaired > 0 {
                    self.save_unlocked(&decoded.document)?;
                }
                if migrated {
                    info!(
                        "Migrated legacy library ({} videos) at {}",
                        decoded.document.len(),
                        self.db_path.display()
                    );
                }

                Ok(LoadedLibrary {
                    document: decoded.document,
                    origin: if migrated {
                        LoadOrigin::Migrated
                    } else {
                        LoadOrigin::Existing
                    },
                })
            }
            Err(e) => self.recover_unlocked(e.to_string()),
        }
    }

    fn recover_unlocked(&self, reason: String) -> CoreResult<LoadedLibrary> {
        if self.policy == CorruptionPolicy::Refuse {
            error!(
                "Library at {} is corrupted, refusing to serve: {}",
                self.db_path.display(),
                reason
            );
            return Err(CoreError::StoreCorrupted {
                path: self.db_path.clone(),
                reason,
            });
        }

        let quarantined = match quarantine_file(&self.db_path) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to quarantine corrupted library: {}", e);
                None
            }
        };
        error!(
            "Library at {} is corrupted ({}); continuing with an empty library, original kept at {:?}",
            self.db_path.display(),
            reason,
            quarantined
        );

        let document = LibraryDocument::new();
        self.save_unlocked(&document)?;
        Ok(LoadedLibrary {
            document,
            origin: LoadOrigin::Recovered {
                quarantined,
                reason,
            },
        })
    }

    fn save_unlocked(&self, document: &LibraryDocument) -> CoreResult<()> {
        atomic_write_json_pretty(&self.db_path, document)?;
        debug!(
            "Saved library ({} videos) to {}",
            document.len(),
            self.db_path.display()
        );
        Ok(())
    }

    /// Load, apply `op`, and save only when `op` reports a change.
    fn update<T>(
        &self,
        op: impl FnOnce(&mut LibraryDocument) -> CoreResult<(T, bool)>,
    ) -> CoreResult<T> {
        self.with_lock(|| {
            let mut document = self.load_unlocked()?.document;
            let (value, changed) = op(&mut document)?;
            if changed {
                self.save_unlocked(&document)?;
            }
            Ok(value)
        })
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Create a record with zeroed counters.
    ///
    /// Fails with [`CoreError::VideoAlreadyExists`] if the id is taken.
    pub fn create(&self, id: &str, filename: &str) -> CoreResult<VideoRecord> {
        validate_path_id_component(id, "videoId").map_err(CoreError::ValidationError)?;
        validate_path_id_component(filename, "filename").map_err(CoreError::ValidationError)?;

        let record = self.update(|document| {
            if document.videos.contains_key(id) {
                return Err(CoreError::VideoAlreadyExists(id.to_string()));
            }
            let record = VideoRecord::new(id, filename);
            document.videos.insert(record.id.clone(), record.clone());
            Ok((record, true))
        })?;

        info!("Created video {} ({})", record.id, record.filename);
        Ok(record)
    }

    /// Look up a record by id
    pub fn get(&self, id: &str) -> CoreResult<Option<VideoRecord>> {
        self.with_lock(|| Ok(self.load_unlocked()?.document.videos.remove(id)))
    }

    /// All records, newest first
    pub fn list(&self) -> CoreResult<Vec<VideoRecord>> {
        let document = self.load()?.document;
        let mut records: Vec<VideoRecord> = document.videos.into_values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Count one view. Unknown ids are ignored and return `None`.
    pub fn increment_view(&self, id: &str) -> CoreResult<Option<VideoRecord>> {
        self.record_event(id, AnalyticsEvent::View)
    }

    /// Count one completed playback. Unknown ids are ignored and return `None`.
    pub fn increment_completion(&self, id: &str) -> CoreResult<Option<VideoRecord>> {
        self.record_event(id, AnalyticsEvent::Complete)
    }

    /// Apply an analytics event to a record, returning the updated record.
    pub fn record_event(&self, id: &str, event: AnalyticsEvent) -> CoreResult<Option<VideoRecord>> {
        let updated = self.update(|document| match document.videos.get_mut(id) {
            Some(record) => {
                record.apply(event);
                Ok((Some(record.clone()), true))
            }
            None => Ok((None, false)),
        })?;

        if updated.is_none() {
            debug!("Ignoring {} event for unknown video {}", event, id);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LibraryStore {
        LibraryStore::new(dir.path().join("data").join("db.json"), CorruptionPolicy::FailOpen)
    }

    #[test]
    fn test_scenario_create_view_complete() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.origin, LoadOrigin::Initialized);
        assert!(loaded.document.is_empty());
        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.db_path()).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "videos": {} }));

        let created = store.create("v1", "clip.webm").unwrap();
        assert_eq!(created.id, "v1");
        assert_eq!(created.filename, "clip.webm");
        assert_eq!(created.views, 0);
        assert_eq!(created.completions, 0);

        store.increment_view("v1").unwrap();
        assert_eq!(store.get("v1").unwrap().unwrap().views, 1);

        store.increment_completion("v1").unwrap();
        let fetched = store.get("v1").unwrap().unwrap();
        assert_eq!(fetched.completions, 1);
        assert_eq!(fetched.views, 1);
    }

    #[test]
    fn test_create_then_get_is_equal() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let created = store.create("abc-123", "abc-123.webm").unwrap();
        let fetched = store.get("abc-123").unwrap().unwrap();
        assert_eq!(created, fetched);
    }

    #[test]
    fn test_second_load_is_existing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load().unwrap().origin, LoadOrigin::Initialized);
        assert_eq!(store.load().unwrap().origin, LoadOrigin::Existing);
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let original = store.create("v1", "first.webm").unwrap();
        store.increment_view("v1").unwrap();

        let err = store.create("v1", "second.webm").unwrap_err();
        assert!(matches!(err, CoreError::VideoAlreadyExists(ref id) if id == "v1"));

        let kept = store.get("v1").unwrap().unwrap();
        assert_eq!(kept.filename, original.filename);
        assert_eq!(kept.views, 1);
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(matches!(
            store.create("", "clip.webm"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            store.create("../x", "clip.webm"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            store.create("v1", "nested/clip.webm"),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_increment_unknown_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.create("v1", "clip.webm").unwrap();
        let before = std::fs::read(store.db_path()).unwrap();

        assert_eq!(store.increment_view("missing").unwrap(), None);
        assert_eq!(store.increment_completion("missing").unwrap(), None);

        let after = std::fs::read(store.db_path()).unwrap();
        assert_eq!(before, after);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_increment_returns_updated_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.create("v1", "clip.webm").unwrap();

        for n in 1..=5u64 {
            let record = store.increment_view("v1").unwrap().unwrap();
            assert_eq!(record.views, n);
        }
        let record = store
            .record_event("v1", AnalyticsEvent::Complete)
            .unwrap()
            .unwrap();
        assert_eq!(record.views, 5);
        assert_eq!(record.completions, 1);
    }

    #[test]
    fn test_legacy_list_is_migrated_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.db_path().parent().unwrap()).unwrap();
        std::fs::write(
            store.db_path(),
            r#"[
                {"id":"a","filename":"a.webm","views":7,"completions":3,"createdAt":"2024-01-01T00:00:00.000Z"},
                {"id":"b","filename":"b.webm","views":0,"completions":0,"createdAt":"2024-02-01T00:00:00.000Z"}
            ]"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.origin, LoadOrigin::Migrated);
        assert_eq!(loaded.document.len(), 2);
        let a = loaded.document.get("a").unwrap();
        assert_eq!((a.views, a.completions), (7, 3));
        assert_eq!(a.filename, "a.webm");

        let migrated_bytes = std::fs::read(store.db_path()).unwrap();
        let on_disk: serde_json::Value = serde_json::from_slice(&migrated_bytes).unwrap();
        assert!(on_disk["videos"]["b"].is_object());

        let again = store.load().unwrap();
        assert_eq!(again.origin, LoadOrigin::Existing);
        assert_eq!(again.document, loaded.document);
        assert_eq!(std::fs::read(store.db_path()).unwrap(), migrated_bytes);
    }

    fn repaired_copies(store: &LibraryStore) -> Vec<PathBuf> {
        let dir = store.db_path().parent().unwrap();
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with("db.json.repaired-")
            })
            .collect()
    }

    #[test]
    fn test_unreadable_legacy_entry_does_not_wipe_the_library() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.db_path().parent().unwrap()).unwrap();
        let original = r#"[
            {"id":"a","filename":"a.webm","views":4,"completions":1,"createdAt":"2024-01-01T00:00:00.000Z"},
            {"id":"b","filename":"b.webm","views":0,"completions":0}
        ]"#;
        std::fs::write(store.db_path(), original).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.origin, LoadOrigin::Migrated);
        assert_eq!(loaded.document.len(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().views, 4);

        let copies = repaired_copies(&store);
        assert_eq!(copies.len(), 1);
        assert_eq!(std::fs::read_to_string(&copies[0]).unwrap(), original);
    }

    #[test]
    fn test_unreadable_record_keeps_serving_the_others() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.db_path().parent().unwrap()).unwrap();
        std::fs::write(
            store.db_path(),
            r#"{"videos":{
                "a":{"id":"a","filename":"a.webm","views":2,"completions":0,"createdAt":"2024-01-01T00:00:00.000Z"},
                "b":{"id":"b","filename":"b.webm","views":-1,"completions":0,"createdAt":"2024-01-01T00:00:00.000Z"}
            }}"#,
        )
        .unwrap();

        let record = store.increment_view("a").unwrap().unwrap();
        assert_eq!(record.views, 3);
        assert_eq!(store.get("a").unwrap().unwrap().views, 3);
        assert!(store.get("b").unwrap().is_none());

        // Repaired once; later loads read the rewritten file as-is.
        assert_eq!(repaired_copies(&store).len(), 1);
        assert_eq!(store.load().unwrap().origin, LoadOrigin::Existing);
        assert_eq!(repaired_copies(&store).len(), 1);
    }

    #[test]
    fn test_write_failure_is_returned_and_leaves_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.create("v1", "clip.webm").unwrap();
        let before = std::fs::read(store.db_path()).unwrap();

        // A directory where the temp file goes makes every save fail.
        let blocker = sibling_path(store.db_path(), "tmp");
        std::fs::create_dir(&blocker).unwrap();

        let err = store.increment_view("v1").unwrap_err();
        assert!(matches!(err, CoreError::IoError(_)));
        assert_eq!(std::fs::read(store.db_path()).unwrap(), before);

        std::fs::remove_dir(&blocker).unwrap();
        assert_eq!(store.increment_view("v1").unwrap().unwrap().views, 1);
    }

    #[test]
    fn test_corrupted_file_fails_open_and_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.db_path().parent().unwrap()).unwrap();
        std::fs::write(store.db_path(), "invalid json {{{").unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.document.is_empty());
        let quarantined = match loaded.origin {
            LoadOrigin::Recovered { quarantined, .. } => quarantined.unwrap(),
            other => panic!("unexpected origin: {other:?}"),
        };
        assert_eq!(std::fs::read_to_string(quarantined).unwrap(), "invalid json {{{");

        // The replacement is a valid empty library.
        assert_eq!(store.load().unwrap().origin, LoadOrigin::Existing);
    }

    #[test]
    fn test_corrupted_file_refused_when_configured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "[{\"id\":").unwrap();
        let store = LibraryStore::new(&path, CorruptionPolicy::Refuse);

        let err = store.load().unwrap_err();
        assert!(err.is_store_unavailable());
        assert!(matches!(store.increment_view("a"), Err(CoreError::StoreCorrupted { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{\"id\":");
    }

    #[test]
    fn test_list_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.db_path().parent().unwrap()).unwrap();
        std::fs::write(
            store.db_path(),
            r#"{"videos":{
                "old":{"id":"old","filename":"old.webm","views":0,"completions":0,"createdAt":"2023-01-01T00:00:00.000Z"},
                "new":{"id":"new","filename":"new.webm","views":0,"completions":0,"createdAt":"2024-01-01T00:00:00.000Z"}
            }}"#,
        )
        .unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_concurrent_increments_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        store.create("v1", "clip.webm").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.increment_view("v1").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        assert_eq!(store.get("v1").unwrap().unwrap().views, 200);
    }

    #[test]
    fn test_separate_store_handles_share_the_file_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        LibraryStore::new(&path, CorruptionPolicy::FailOpen)
            .create("v1", "clip.webm")
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = LibraryStore::new(path, CorruptionPolicy::FailOpen);
                    for _ in 0..20 {
                        store.increment_completion("v1").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        let store = LibraryStore::new(&path, CorruptionPolicy::FailOpen);
        assert_eq!(store.get("v1").unwrap().unwrap().completions, 80);
    }

    #[test]
    fn test_concurrent_distinct_ids_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        let ids = ["a", "b", "c", "d"];
        for id in ids {
            store.create(id, &format!("{id}.webm")).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let store = Arc::clone(&store);
                let id = id.to_string();
                thread::spawn(move || {
                    for _ in 0..(i + 1) * 5 {
                        store.increment_view(&id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.get(id).unwrap().unwrap().views, ((i + 1) * 5) as u64);
        }
    }
}
