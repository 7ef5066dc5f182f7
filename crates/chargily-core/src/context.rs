//! Per-process selection state, owned by the manager and never persisted.

use crate::mode::{Mode, resolve_mode};
use crate::registry::Registry;

/// Which application is current and whether a global mode override applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessContext {
    /// Empty when no application is selected.
    pub current_application: String,
    pub global_mode_override: Option<Mode>,
}

impl ProcessContext {
    /// Pick the startup application: `preferred` if registered, else the
    /// first registered id, else none.
    #[must_use]
    pub fn select(registry: &Registry, preferred: &str, global_mode_override: Option<Mode>) -> Self {
        let current_application = if registry.contains(preferred) {
            preferred.to_owned()
        } else {
            registry.ids().next().unwrap_or_default().to_owned()
        };
        Self {
            current_application,
            global_mode_override,
        }
    }

    #[must_use]
    pub fn has_current_application(&self) -> bool {
        !self.current_application.is_empty()
    }

    /// Effective mode for `id` (or the current application when `None`).
    #[must_use]
    pub fn effective_mode(&self, registry: &Registry, id: Option<&str>) -> Mode {
        let id = id.unwrap_or(&self.current_application);
        let stored = registry.get(id).map(|app| app.current_mode);
        resolve_mode(self.global_mode_override, stored)
    }
}
