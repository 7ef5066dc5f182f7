//! In-memory document store for testing.
//!
//! Holds the document and a set of artifact names behind a shared mutex.
//! Clones share state, so a test can keep a handle after giving the store
//! away and inspect what was written.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{DocumentStore, StorageError, is_export_artifact};

#[derive(Debug, Default)]
struct State {
    document: Option<Vec<u8>>,
    artifacts: BTreeSet<String>,
    fail_writes: bool,
}

/// An in-memory [`DocumentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store with no document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `document`.
    #[must_use]
    pub fn with_document(document: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.document = Some(document.into());
        }
        store
    }

    /// Register an artifact name as if an export had been written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the state mutex is poisoned.
    pub fn add_artifact(&self, name: &str) -> Result<(), StorageError> {
        self.state()?.artifacts.insert(name.to_owned());
        Ok(())
    }

    /// Artifact names currently present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the state mutex is poisoned.
    pub fn artifacts(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.state()?.artifacts.iter().cloned().collect())
    }

    /// Make every subsequent write fail, to exercise error paths.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the state mutex is poisoned.
    pub fn fail_writes(&self, fail: bool) -> Result<(), StorageError> {
        self.state()?.fail_writes = fail;
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state.lock().map_err(|_| StorageError::Read {
            path: self.location(),
            reason: "state mutex poisoned".to_owned(),
        })
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state()?.document.clone())
    }

    fn save(&self, document: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state()?;
        if state.fail_writes {
            return Err(StorageError::Write {
                path: self.location(),
                reason: "simulated write failure".to_owned(),
            });
        }
        state.document = Some(document.to_vec());
        Ok(())
    }

    fn wipe(&self) -> Result<(), StorageError> {
        let mut state = self.state()?;
        state.document = None;
        Ok(())
    }

    fn purge_artifacts(&self, application_id: &str) -> Result<usize, StorageError> {
        let mut state = self.state()?;
        let before = state.artifacts.len();
        state
            .artifacts
            .retain(|name| !is_export_artifact(name, application_id));
        Ok(before - state.artifacts.len())
    }

    fn location(&self) -> String {
        "memory".to_owned()
    }
}
