//! Document storage for the Chargily Pay CLI.
//!
//! This crate defines the [`DocumentStore`] trait, a single opaque document
//! plus the sidecar artifacts that live next to it. It knows nothing about
//! applications, modes, or JSON shapes; parsing and schema handling happen in
//! `chargily-core`.
//!
//! Two implementations are provided:
//!
//! - [`FileStore`]: production default. Atomic temp-file + rename writes,
//!   an exclusive advisory lock held for the store's lifetime.
//! - [`MemoryStore`]: in-memory, for testing only.

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Sidecar cache files removed together with the document on a full wipe.
pub const SIDECAR_CACHE_FILES: [&str; 2] = ["balance_cache.json", "payment_cache.json"];

/// A store holding exactly one document.
///
/// Implementations must never leave a partially written document behind: a
/// failed [`save`](DocumentStore::save) keeps the previous content intact.
pub trait DocumentStore: Send + std::fmt::Debug {
    /// Read the whole document.
    ///
    /// Returns `Ok(None)` if no document has been written yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the document exists but cannot be read.
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the document cannot be written.
    fn save(&self, document: &[u8]) -> Result<(), StorageError>;

    /// Delete the document and every sidecar cache. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if an existing file cannot be removed.
    fn wipe(&self) -> Result<(), StorageError>;

    /// Remove export artifacts that belong to one application.
    ///
    /// Returns how many artifacts were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if a matching artifact cannot be removed.
    fn purge_artifacts(&self, application_id: &str) -> Result<usize, StorageError>;

    /// Human-readable location used in logs and error messages.
    fn location(&self) -> String;
}

/// Whether `file_name` is a payment export written for `application_id`.
///
/// Exports are named `payments_export_<id>_<mode>_<timestamp>.csv`, where the
/// timestamp only contains digits and underscores. Matching the full shape
/// keeps `shop` from claiming exports of `shop_eu`.
#[must_use]
pub fn is_export_artifact(file_name: &str, application_id: &str) -> bool {
    let prefix = format!("payments_export_{application_id}_");
    let Some(rest) = file_name
        .strip_prefix(&prefix)
        .and_then(|r| r.strip_suffix(".csv"))
    else {
        return false;
    };

    let Some(stamp) = rest
        .strip_prefix("test_")
        .or_else(|| rest.strip_prefix("live_"))
    else {
        return false;
    };

    !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit() || c == '_')
}
