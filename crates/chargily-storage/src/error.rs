//! Storage error types.
//!
//! Every variant names the file (or store) involved so a failure can be
//! diagnosed from the message alone.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to prepare the store at the given path.
    #[error("failed to open store at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Another process holds the store lock.
    #[error("store at '{path}' is locked by another process")]
    Locked { path: String },

    /// Failed to read the document.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Failed to write the document.
    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Failed to delete a file.
    #[error("failed to delete '{path}': {reason}")]
    Delete { path: String, reason: String },
}
