//! File-backed document store.
//!
//! The document is one file on disk. Writes go to a temp file in the same
//! directory, are synced, then renamed over the target, so a crash mid-write
//! leaves the previous document intact.
//!
//! # Locking
//!
//! Opening a [`FileStore`] takes an exclusive advisory lock on a `.lock`
//! sibling of the document and holds it until the store is dropped. A second
//! process opening the same path gets [`StorageError::Locked`] instead of
//! racing on load-modify-save.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::{DocumentStore, SIDECAR_CACHE_FILES, StorageError, is_export_artifact};

/// A document store backed by a single JSON file.
pub struct FileStore {
    path: PathBuf,
    lock: File,
}

impl FileStore {
    /// Open (or prepare) the store at `path` and take the process lock.
    ///
    /// Creates the parent directory if needed. The document itself is not
    /// created until the first [`save`](DocumentStore::save).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Open`] if the directory or lock file cannot be created.
    /// - [`StorageError::Locked`] if another process holds the lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let dir = parent_dir(&path);

        fs::create_dir_all(dir).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: format!("failed to create directory '{}': {e}", dir.display()),
        })?;

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&lock_path)
            .map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                reason: format!("failed to open lock file: {e}"),
            })?;

        lock.try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                StorageError::Locked {
                    path: path.display().to_string(),
                }
            } else {
                StorageError::Open {
                    path: path.display().to_string(),
                    reason: format!("failed to acquire lock: {e}"),
                }
            }
        })?;

        debug!(path = %path.display(), "opened file store");
        Ok(Self { path, lock })
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove_if_present(path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Delete {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, document: &[u8]) -> Result<(), StorageError> {
        let write_err = |reason: String| StorageError::Write {
            path: self.path.display().to_string(),
            reason,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(&self.path))
            .map_err(|e| write_err(format!("failed to create temp file: {e}")))?;

        tmp.write_all(document)
            .map_err(|e| write_err(format!("failed to write temp file: {e}")))?;

        tmp.as_file()
            .sync_all()
            .map_err(|e| write_err(format!("failed to sync temp file: {e}")))?;

        tmp.persist(&self.path)
            .map_err(|e| write_err(format!("failed to replace document: {e}")))?;

        debug!(path = %self.path.display(), bytes = document.len(), "saved document");
        Ok(())
    }

    fn wipe(&self) -> Result<(), StorageError> {
        Self::remove_if_present(&self.path)?;

        let dir = parent_dir(&self.path);
        for name in SIDECAR_CACHE_FILES {
            Self::remove_if_present(&dir.join(name))?;
        }

        debug!(path = %self.path.display(), "wiped file store");
        Ok(())
    }

    fn purge_artifacts(&self, application_id: &str) -> Result<usize, StorageError> {
        let dir = parent_dir(&self.path);
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::Read {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_export_artifact(name, application_id) && Self::remove_if_present(&entry.path())? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(application = application_id, removed, "purged export artifacts");
        }
        Ok(removed)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::open(dir.path().join("applications.json")).unwrap()
    }

    #[test]
    fn load_missing_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(b"{\"a\":1}").unwrap();
        assert_eq!(store.load().unwrap(), Some(b"{\"a\":1}".to_vec()));
    }

    #[test]
    fn save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(b"first").unwrap();
        store.save(b"second").unwrap();
        assert_eq!(store.load().unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(b"data").unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["applications.json", "applications.lock"]);
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("apps.json");
        let store = FileStore::open(&path).unwrap();
        store.save(b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn second_open_is_locked_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applications.json");

        let first = FileStore::open(&path).unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Locked { .. }));

        drop(first);
        assert!(FileStore::open(&path).is_ok());
    }

    #[test]
    fn wipe_removes_document_and_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(b"data").unwrap();
        fs::write(dir.path().join("balance_cache.json"), b"{}").unwrap();
        fs::write(dir.path().join("payment_cache.json"), b"{}").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        store.wipe().unwrap();

        assert!(store.load().unwrap().is_none());
        assert!(!dir.path().join("balance_cache.json").exists());
        assert!(!dir.path().join("payment_cache.json").exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn wipe_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.wipe().unwrap();
        store.wipe().unwrap();
    }

    #[test]
    fn purge_artifacts_only_touches_matching_exports() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let own = dir.path().join("payments_export_shop_test_2024_01_01_00_00_00.csv");
        let other = dir.path().join("payments_export_shop_eu_live_2024_01_01_00_00_00.csv");
        fs::write(&own, b"id").unwrap();
        fs::write(&other, b"id").unwrap();

        let removed = store.purge_artifacts("shop").unwrap();

        assert_eq!(removed, 1);
        assert!(!own.exists());
        assert!(other.exists());
    }
}
