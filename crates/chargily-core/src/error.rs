//! Error types for `chargily-core`.
//!
//! Every variant carries the offending id, mode, or store location so the
//! command layer can render a message without extra lookups. Errors never
//! include API key material.

use chargily_storage::StorageError;

/// Errors from the configuration manager.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The referenced application is not in the registry.
    #[error("application '{id}' does not exist")]
    NotFound { id: String },

    /// The referenced template is not one of the built-in templates.
    #[error("template '{id}' does not exist")]
    TemplateNotFound { id: String },

    /// An application with this id is already registered.
    #[error("application '{id}' already exists")]
    AlreadyExists { id: String },

    /// The mode is neither `test` nor `live`.
    #[error("invalid mode '{mode}': must be 'test' or 'live'")]
    InvalidMode { mode: String },

    /// The id does not match `^[a-z0-9_]+$`.
    #[error("invalid application id '{id}': use lowercase letters, digits and underscores")]
    InvalidId { id: String },

    /// A partial update would leave the application in an invalid shape.
    #[error("invalid update for application '{id}': {reason}")]
    InvalidUpdate { id: String, reason: String },

    /// The store holds content that is not a valid registry.
    #[error("configuration store '{location}' is corrupt: {reason}")]
    CorruptStore { location: String, reason: String },

    /// The store was written by a newer schema than this build understands.
    #[error(
        "configuration store '{location}' uses schema version {found}, newest supported is {supported}"
    )]
    UnsupportedSchema {
        location: String,
        found: u64,
        supported: u32,
    },

    /// The registry could not be serialized.
    #[error("failed to serialize registry: {reason}")]
    Serialization { reason: String },

    /// The storage layer failed to read or write.
    #[error("configuration storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ConfigError {
    /// A short remedial hint for the user.
    #[must_use]
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => {
                "Check the application id with `chargily app list` or create the application first."
            }
            Self::TemplateNotFound { .. } => "Run `chargily templates` to see the available templates.",
            Self::AlreadyExists { .. } => {
                "Choose a different id or update the existing application."
            }
            Self::InvalidMode { .. } => "Use either 'test' or 'live'.",
            Self::InvalidId { .. } => "Use an id such as 'my_shop' or 'store2'.",
            Self::InvalidUpdate { .. } => "Check the field names and value types in the update.",
            Self::CorruptStore { .. } => {
                "Fix or move the configuration file, or run `chargily reset` to start over."
            }
            Self::UnsupportedSchema { .. } => "Upgrade the CLI to a newer version.",
            Self::Serialization { .. } | Self::Storage(_) => {
                "Check file permissions and free disk space, then retry."
            }
        }
    }
}
