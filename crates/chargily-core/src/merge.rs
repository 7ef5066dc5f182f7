//! Recursive merge for partial updates.
//!
//! Objects merge key by key at every depth. Everything else in the patch
//! (strings, numbers, booleans, `null`, and arrays) replaces the base value
//! wholesale. Arrays are never concatenated, so `metadata.tags` in a patch is
//! the complete new list.

use serde_json::Value;

/// Merge `patch` into `base` in place.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, patch) => *slot = patch,
    }
}
