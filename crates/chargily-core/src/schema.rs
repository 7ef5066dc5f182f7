//! On-disk document format and migrations.
//!
//! Current layout (version 1):
//!
//! ```json
//! { "schema_version": 1, "applications": { "<id>": { ... } } }
//! ```
//!
//! Files without `schema_version` are version 0: the bare id → application
//! map written by earlier releases. Version 0 also used `[]` for an empty map
//! (both for the registry itself and for `metadata`), which is normalized
//! here. Migrated content is rewritten in the current layout on the next
//! save.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::registry::Registry;

/// Newest layout this build reads and the only one it writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Result of decoding a stored document.
#[derive(Debug)]
pub struct Decoded {
    pub registry: Registry,
    /// Version the document was stored in, before migration.
    pub source_version: u64,
}

impl Decoded {
    /// Whether the document was upgraded and should be written back.
    #[must_use]
    pub fn migrated(&self) -> bool {
        self.source_version < u64::from(SCHEMA_VERSION)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema_version: u32,
    applications: &'a Registry,
}

#[derive(Deserialize)]
struct Envelope {
    applications: Registry,
}

/// Serialize the registry as pretty JSON in the current layout.
///
/// # Errors
///
/// Returns [`ConfigError::Serialization`] if an application holds a value
/// that cannot be encoded.
pub fn encode(registry: &Registry) -> Result<Vec<u8>, ConfigError> {
    let envelope = EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        applications: registry,
    };
    let mut bytes =
        serde_json::to_vec_pretty(&envelope).map_err(|e| ConfigError::Serialization {
            reason: e.to_string(),
        })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse and, if needed, migrate a stored document.
///
/// Whitespace-only input is an empty registry.
///
/// # Errors
///
/// - [`ConfigError::CorruptStore`] if the content is not valid JSON, does not
///   match the expected shape, or contains an invalid application id.
/// - [`ConfigError::UnsupportedSchema`] if the document is newer than
///   [`SCHEMA_VERSION`].
pub fn decode(bytes: &[u8], location: &str) -> Result<Decoded, ConfigError> {
    let corrupt = |reason: String| ConfigError::CorruptStore {
        location: location.to_owned(),
        reason,
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Decoded {
            registry: Registry::new(),
            source_version: u64::from(SCHEMA_VERSION),
        });
    }

    let value: Value = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

    let version = match &value {
        Value::Array(items) if items.is_empty() => {
            return Ok(Decoded {
                registry: Registry::new(),
                source_version: 0,
            });
        }
        Value::Object(map) => match map.get("schema_version") {
            None => None,
            Some(version) => Some(version.as_u64().ok_or_else(|| {
                corrupt(format!("schema_version must be a non-negative integer, got {version}"))
            })?),
        },
        other => {
            return Err(corrupt(format!(
                "expected a JSON object at the top level, found {}",
                kind(other)
            )));
        }
    };

    let decoded = match version {
        None => Decoded {
            registry: migrate_v0(value).map_err(corrupt)?,
            source_version: 0,
        },
        Some(found) if found > u64::from(SCHEMA_VERSION) => {
            return Err(ConfigError::UnsupportedSchema {
                location: location.to_owned(),
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Some(found) => {
            // Parse from the original bytes so duplicate ids are caught.
            let envelope: Envelope =
                serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
            Decoded {
                registry: envelope.applications,
                source_version: found,
            }
        }
    };

    if let Some(bad) = decoded.registry.ids().find(|id| !is_valid_id(id)) {
        return Err(corrupt(format!("invalid application id '{bad}'")));
    }

    Ok(decoded)
}

/// Whether `id` matches `^[a-z0-9_]+$`.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn migrate_v0(mut value: Value) -> Result<Registry, String> {
    if let Value::Object(apps) = &mut value {
        for app in apps.values_mut().filter_map(Value::as_object_mut) {
            if matches!(app.get("metadata"), Some(Value::Array(items)) if items.is_empty()) {
                app.insert("metadata".to_owned(), Value::Object(serde_json::Map::new()));
            }
        }
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
