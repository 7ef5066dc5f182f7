//! Core library for the Chargily Pay CLI.
//!
//! Contains the application data model, the insertion-ordered registry, the
//! test/live mode resolver, built-in templates, the versioned on-disk schema,
//! runtime configuration, and the [`manager::ConfigManager`] that ties them
//! together. This crate depends on `chargily-storage` for the document store
//! trait and knows nothing about HTTP or terminals.

pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod merge;
pub mod mode;
pub mod model;
pub mod registry;
pub mod schema;
pub mod templates;

pub use config::RuntimeConfig;
pub use error::ConfigError;
pub use manager::ConfigManager;
pub use mode::Mode;
