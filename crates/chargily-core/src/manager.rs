//! The configuration manager.
//!
//! Owns the application registry, the process context, and the store they
//! persist to. Every mutation is computed on a copy of the registry and only
//! swapped in after the store accepted the new document, so a failed write
//! leaves both memory and disk at the previous state.

use chargily_storage::{DocumentStore, FileStore};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::context::ProcessContext;
use crate::error::ConfigError;
use crate::merge::deep_merge;
use crate::mode::Mode;
use crate::model::{
    Application, ApplicationConfig, ApplicationStats, Credentials, ProfileInput, ValidationReport,
};
use crate::registry::Registry;
use crate::schema::{self, is_valid_id};
use crate::templates::{self, Template};

/// Top-level fields a partial update may touch.
const UPDATABLE_FIELDS: [&str; 6] = ["name", "test", "live", "current_mode", "settings", "metadata"];

/// Mode profile fields only a balance fetch may write.
const CACHE_FIELDS: [&str; 2] = ["balance_cache", "last_balance_check"];

/// Registry, process context and persistence for one CLI run.
#[derive(Debug)]
pub struct ConfigManager {
    store: Box<dyn DocumentStore>,
    registry: Registry,
    context: ProcessContext,
    test_base_url: String,
    live_base_url: String,
}

impl ConfigManager {
    /// Open the file store at `config.config_path` and load it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Storage` if the file cannot be opened or is
    /// locked by another process, and any error from [`Self::with_store`].
    pub fn open(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        let store = FileStore::open(&config.config_path)?;
        Self::with_store(Box::new(store), config)
    }

    /// Load the registry from `store`, seeding it when no document exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CorruptStore` or `ConfigError::UnsupportedSchema`
    /// for unreadable content, and `ConfigError::Storage` if the store fails.
    pub fn with_store(
        store: Box<dyn DocumentStore>,
        config: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        let location = store.location();
        let registry = match store.load()? {
            Some(bytes) => {
                let decoded = schema::decode(&bytes, &location)?;
                if decoded.migrated() {
                    info!(
                        location = %location,
                        from = decoded.source_version,
                        to = schema::SCHEMA_VERSION,
                        "migrated configuration schema"
                    );
                }
                decoded.registry
            }
            None => {
                let seeded = templates::seed_registry(&config.seed, Utc::now());
                store.save(&schema::encode(&seeded)?)?;
                info!(location = %location, "initialized configuration store");
                seeded
            }
        };

        let context = ProcessContext::select(
            &registry,
            &config.default_application,
            config.global_mode_override,
        );
        debug!(
            applications = registry.len(),
            current = %context.current_application,
            "configuration loaded"
        );

        Ok(Self {
            store,
            registry,
            context,
            test_base_url: config.test_base_url.clone(),
            live_base_url: config.live_base_url.clone(),
        })
    }

    /// Where the registry is persisted.
    #[must_use]
    pub fn location(&self) -> String {
        self.store.location()
    }

    // ── Queries ──────────────────────────────────────────────────────

    #[must_use]
    pub fn applications(&self) -> &Registry {
        &self.registry
    }

    /// Application ids in registry order.
    #[must_use]
    pub fn application_ids(&self) -> Vec<String> {
        self.registry.ids().map(str::to_owned).collect()
    }

    #[must_use]
    pub fn application_exists(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn application(&self, id: &str) -> Result<&Application, ConfigError> {
        self.registry
            .get(id)
            .ok_or_else(|| ConfigError::NotFound { id: id.to_owned() })
    }

    #[must_use]
    pub fn process_context(&self) -> &ProcessContext {
        &self.context
    }

    /// The current application id, or `""` when none is selected.
    #[must_use]
    pub fn current_application(&self) -> &str {
        &self.context.current_application
    }

    /// Effective mode for `id`, or for the current application when `None`.
    ///
    /// A global override always wins. Unknown or empty ids resolve to
    /// [`Mode::Test`].
    #[must_use]
    pub fn current_mode(&self, id: Option<&str>) -> Mode {
        self.context.effective_mode(&self.registry, id)
    }

    /// The configured key for `(id, mode)`. A missing or empty key is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn api_key(&self, id: &str, mode: Mode) -> Result<Option<&str>, ConfigError> {
        let profile = self.application(id)?.profile(mode);
        Ok(profile.api_key.as_deref().filter(|k| !k.is_empty()))
    }

    /// The last cached balance payload, if any. Unknown ids have no cache.
    #[must_use]
    pub fn cached_balance(&self, id: &str, mode: Mode) -> Option<&Value> {
        self.registry
            .get(id)
            .and_then(|app| app.profile(mode).balance_cache.as_ref())
    }

    /// Endpoint for `mode`.
    #[must_use]
    pub fn base_url(&self, mode: Mode) -> &str {
        match mode {
            Mode::Test => &self.test_base_url,
            Mode::Live => &self.live_base_url,
        }
    }

    /// What the API gateway needs to call on behalf of `(id, mode)`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn credentials(&self, id: &str, mode: Mode) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            application: id.to_owned(),
            mode,
            api_key: self.api_key(id, mode)?.map(str::to_owned),
            base_url: self.base_url(mode).to_owned(),
        })
    }

    /// A copy of the application with keys, webhook secrets and balance
    /// caches removed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn export_application(&self, id: &str) -> Result<Application, ConfigError> {
        Ok(self.application(id)?.redacted())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn application_stats(&self, id: &str) -> Result<ApplicationStats, ConfigError> {
        let app = self.application(id)?;
        let cached = |mode: Mode| {
            app.profile(mode)
                .balance_cache
                .as_ref()
                .is_some_and(|v| !v.is_null())
        };
        Ok(ApplicationStats {
            name: app.name.clone(),
            current_mode: app.current_mode,
            created_at: app.created_at,
            last_used: app.last_used,
            has_test_key: app.test.has_api_key(),
            has_live_key: app.live.has_api_key(),
            test_balance_cached: cached(Mode::Test),
            live_balance_cached: cached(Mode::Live),
            test_last_balance_check: app.test.last_balance_check,
            live_last_balance_check: app.live.last_balance_check,
        })
    }

    /// Check that `(id, mode)` has what payment flows need.
    ///
    /// An incomplete application is reported, not rejected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered.
    pub fn validate_application(
        &self,
        id: &str,
        mode: Mode,
    ) -> Result<ValidationReport, ConfigError> {
        let profile = self.application(id)?.profile(mode);
        let missing = |value: Option<&String>| value.is_none_or(String::is_empty);

        let mut errors = Vec::new();
        if !profile.has_api_key() {
            errors.push(format!("Missing API key for {mode} mode"));
        }
        if missing(profile.webhook_url.as_ref()) {
            errors.push(format!("Missing webhook URL for {mode} mode"));
        }
        if missing(profile.default_success_url.as_ref()) {
            errors.push(format!("Missing default success URL for {mode} mode"));
        }
        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    /// The built-in templates.
    #[must_use]
    pub fn templates(&self) -> Vec<Template> {
        templates::builtin_templates()
    }

    /// # Errors
    ///
    /// Returns `ConfigError::TemplateNotFound` for an unknown template id.
    pub fn template(&self, template_id: &str) -> Result<Template, ConfigError> {
        templates::find_template(template_id).ok_or_else(|| ConfigError::TemplateNotFound {
            id: template_id.to_owned(),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register a new application in `test` mode.
    ///
    /// Missing per-mode fields stay empty and settings fall back to the
    /// defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidId` if `id` does not match `^[a-z0-9_]+$`.
    /// - `ConfigError::AlreadyExists` if `id` is taken.
    /// - `ConfigError::Storage` if the registry cannot be saved.
    pub fn create_application(
        &mut self,
        id: &str,
        name: &str,
        config: ApplicationConfig,
    ) -> Result<(), ConfigError> {
        self.check_new_id(id)?;

        let now = Utc::now();
        let app = Application {
            name: name.to_owned(),
            test: config.test.into_profile(),
            live: config.live.into_profile(),
            current_mode: Mode::Test,
            settings: config.settings.unwrap_or_default(),
            created_at: now,
            last_used: Some(now),
            metadata: config.metadata,
        };

        let mut next = self.registry.clone();
        next.insert(id, app);
        self.commit(next)?;
        info!(application = %id, "application created");
        Ok(())
    }

    /// Create an application whose settings and metadata come from a
    /// built-in template. Credentials start empty.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TemplateNotFound` for an unknown template, and
    /// any error from [`Self::create_application`].
    pub fn create_application_from_template(
        &mut self,
        template_id: &str,
        id: &str,
        name: &str,
    ) -> Result<(), ConfigError> {
        let template = self.template(template_id)?;
        let config = ApplicationConfig {
            metadata: template.metadata(),
            settings: Some(template.settings),
            ..ApplicationConfig::default()
        };
        self.create_application(id, name, config)
    }

    /// Re-create an exported application under `id`.
    ///
    /// Name, URLs, settings and metadata are taken from `exported`. Keys,
    /// webhook secrets and caches are never imported, and the mode starts
    /// at `test`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_application`].
    pub fn import_application(
        &mut self,
        id: &str,
        exported: &Application,
    ) -> Result<(), ConfigError> {
        let urls_only = |mode: Mode| {
            let profile = exported.profile(mode);
            ProfileInput {
                webhook_url: profile.webhook_url.clone(),
                default_success_url: profile.default_success_url.clone(),
                default_failure_url: profile.default_failure_url.clone(),
                ..ProfileInput::default()
            }
        };
        let config = ApplicationConfig {
            test: urls_only(Mode::Test),
            live: urls_only(Mode::Live),
            settings: Some(exported.settings.clone()),
            metadata: exported.metadata.clone(),
        };
        self.create_application(id, &exported.name, config)
    }

    /// Apply a partial update.
    ///
    /// Nested objects merge key by key; scalars and arrays replace the
    /// stored value. The merged result must still be a valid application.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` if `id` is not registered.
    /// - `ConfigError::InvalidUpdate` if `patch` is not an object, names an
    ///   unknown field, or produces an invalid application.
    /// - `ConfigError::Storage` if the registry cannot be saved.
    pub fn update_application(&mut self, id: &str, patch: Value) -> Result<(), ConfigError> {
        let current = self.application(id)?;
        let invalid = |reason: String| ConfigError::InvalidUpdate {
            id: id.to_owned(),
            reason,
        };

        let Value::Object(fields) = &patch else {
            return Err(invalid("update must be a JSON object".to_owned()));
        };
        if let Some(unknown) = fields.keys().find(|k| !UPDATABLE_FIELDS.contains(&k.as_str())) {
            return Err(invalid(format!("unknown field '{unknown}'")));
        }
        for mode in Mode::ALL {
            let Some(Value::Object(profile)) = fields.get(mode.as_str()) else {
                continue;
            };
            if let Some(cached) = profile.keys().find(|k| CACHE_FIELDS.contains(&k.as_str())) {
                return Err(invalid(format!("field '{mode}.{cached}' is read-only")));
            }
        }
        let touched: Vec<String> = fields.keys().cloned().collect();

        let mut merged = serde_json::to_value(current).map_err(|e| invalid(e.to_string()))?;
        deep_merge(&mut merged, patch);
        let updated: Application =
            serde_json::from_value(merged).map_err(|e| invalid(e.to_string()))?;

        let mut next = self.registry.clone();
        next.insert(id, updated);
        self.commit(next)?;
        info!(application = %id, fields = ?touched, "application updated");
        Ok(())
    }

    /// Remove an application and its export artifacts.
    ///
    /// The current-application pointer is cleared if it pointed at `id`.
    /// Artifacts are purged only after the registry was saved; a purge
    /// failure is logged and does not undo the deletion.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered and
    /// `ConfigError::Storage` if the registry cannot be saved.
    pub fn delete_application(&mut self, id: &str) -> Result<(), ConfigError> {
        self.application(id)?;

        let mut next = self.registry.clone();
        next.remove(id);
        self.commit(next)?;

        if self.context.current_application == id {
            self.context.current_application.clear();
        }
        let purged = match self.store.purge_artifacts(id) {
            Ok(count) => count,
            Err(e) => {
                warn!(application = %id, error = %e, "failed to purge export artifacts");
                0
            }
        };
        info!(application = %id, purged_artifacts = purged, "application deleted");
        Ok(())
    }

    /// Copy `source_id` to `new_id` without credentials or cached data.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` if the source is not registered.
    /// - `ConfigError::InvalidId` / `ConfigError::AlreadyExists` for the
    ///   target id.
    /// - `ConfigError::Storage` if the registry cannot be saved.
    pub fn clone_application(
        &mut self,
        source_id: &str,
        new_id: &str,
        new_name: &str,
    ) -> Result<(), ConfigError> {
        let mut copy = self.application(source_id)?.redacted();
        self.check_new_id(new_id)?;

        copy.name = new_name.to_owned();
        copy.created_at = Utc::now();
        copy.last_used = None;

        let mut next = self.registry.clone();
        next.insert(new_id, copy);
        self.commit(next)?;
        info!(source = %source_id, application = %new_id, "application cloned");
        Ok(())
    }

    /// Make `id` the current application and stamp `last_used`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered and
    /// `ConfigError::Storage` if the registry cannot be saved.
    pub fn set_current_application(&mut self, id: &str) -> Result<(), ConfigError> {
        self.application(id)?;

        let mut next = self.registry.clone();
        if let Some(app) = next.get_mut(id) {
            app.last_used = Some(Utc::now());
        }
        self.commit(next)?;

        self.context.current_application = id.to_owned();
        info!(application = %id, "current application changed");
        Ok(())
    }

    /// Persist the stored mode of `id`. The global override is untouched.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidMode` if `mode` is not `test` or `live`.
    /// - `ConfigError::NotFound` if `id` is not registered.
    /// - `ConfigError::Storage` if the registry cannot be saved.
    pub fn set_current_mode(&mut self, id: &str, mode: &str) -> Result<(), ConfigError> {
        let mode: Mode = mode.parse()?;
        self.application(id)?;

        let mut next = self.registry.clone();
        if let Some(app) = next.get_mut(id) {
            app.current_mode = mode;
        }
        self.commit(next)?;

        if let Some(forced) = self.context.global_mode_override.filter(|f| *f != mode) {
            warn!(
                application = %id,
                stored = %mode,
                effective = %forced,
                "stored mode changed but the global override still applies"
            );
        }
        info!(application = %id, mode = %mode, "mode changed");
        Ok(())
    }

    /// Replace the key for `(id, mode)`. An empty key clears it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered and
    /// `ConfigError::Storage` if the registry cannot be saved.
    pub fn set_api_key(&mut self, id: &str, mode: Mode, api_key: &str) -> Result<(), ConfigError> {
        self.application(id)?;

        let mut next = self.registry.clone();
        if let Some(app) = next.get_mut(id) {
            app.profile_mut(mode).api_key = Some(api_key.to_owned()).filter(|k| !k.is_empty());
        }
        self.commit(next)?;
        info!(application = %id, mode = %mode, "api key updated");
        Ok(())
    }

    /// Store a freshly fetched balance payload verbatim.
    ///
    /// Call only after the fetch succeeded.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if `id` is not registered and
    /// `ConfigError::Storage` if the registry cannot be saved.
    pub fn update_balance_cache(
        &mut self,
        id: &str,
        mode: Mode,
        payload: Value,
    ) -> Result<(), ConfigError> {
        self.application(id)?;

        let mut next = self.registry.clone();
        if let Some(app) = next.get_mut(id) {
            let profile = app.profile_mut(mode);
            profile.balance_cache = Some(payload);
            profile.last_balance_check = Some(Utc::now());
        }
        self.commit(next)?;
        debug!(application = %id, mode = %mode, "balance cache updated");
        Ok(())
    }

    /// Delete the store and its sidecar caches, and forget every
    /// application. The global override is kept.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Storage` if the files cannot be removed.
    pub fn reset_all_configuration(&mut self) -> Result<(), ConfigError> {
        self.store.wipe()?;
        let removed = self.registry.len();
        self.registry = Registry::new();
        self.context.current_application.clear();
        warn!(
            location = %self.store.location(),
            removed_applications = removed,
            "all configuration reset"
        );
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn check_new_id(&self, id: &str) -> Result<(), ConfigError> {
        if !is_valid_id(id) {
            return Err(ConfigError::InvalidId { id: id.to_owned() });
        }
        if self.registry.contains(id) {
            return Err(ConfigError::AlreadyExists { id: id.to_owned() });
        }
        Ok(())
    }

    /// Persist `next`, then make it the live registry.
    fn commit(&mut self, next: Registry) -> Result<(), ConfigError> {
        let bytes = schema::encode(&next)?;
        self.store.save(&bytes)?;
        self.registry = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chargily_storage::MemoryStore;
    use serde_json::json;

    use super::*;
    use crate::model::SafetyLimits;

    const SHOP_TEST_KEY: &str = "test_sk_abc";
    const SHOP_LIVE_KEY: &str = "live_sk_xyz";

    fn config() -> RuntimeConfig {
        RuntimeConfig::from_lookup(|_| None)
    }

    fn empty_manager() -> (ConfigManager, MemoryStore) {
        empty_manager_with(&config())
    }

    fn empty_manager_with(config: &RuntimeConfig) -> (ConfigManager, MemoryStore) {
        let store = MemoryStore::with_document(Vec::new());
        let manager = ConfigManager::with_store(Box::new(store.clone()), config).unwrap();
        (manager, store)
    }

    fn shop_config() -> ApplicationConfig {
        ApplicationConfig {
            test: ProfileInput::with_api_key(SHOP_TEST_KEY),
            ..ApplicationConfig::default()
        }
    }

    fn manager_with_shop() -> (ConfigManager, MemoryStore) {
        let (mut manager, store) = empty_manager();
        manager.create_application("shop", "Shop", shop_config()).unwrap();
        (manager, store)
    }

    fn stored(store: &MemoryStore) -> Registry {
        let bytes = store.load().unwrap().unwrap();
        schema::decode(&bytes, "mem").unwrap().registry
    }

    // ── Loading ──────────────────────────────────────────────────────

    #[test]
    fn missing_store_is_seeded_and_persisted() {
        let store = MemoryStore::new();
        let manager = ConfigManager::with_store(Box::new(store.clone()), &config()).unwrap();

        assert_eq!(manager.application_ids(), vec!["main"]);
        assert_eq!(manager.current_application(), "main");
        assert_eq!(stored(&store), *manager.applications());
    }

    #[test]
    fn empty_store_has_no_applications() {
        let (manager, _) = empty_manager();
        assert!(manager.applications().is_empty());
        assert_eq!(manager.current_application(), "");
        assert_eq!(manager.current_mode(None), Mode::Test);
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let store = MemoryStore::with_document(b"{ definitely not json".to_vec());
        let err = ConfigManager::with_store(Box::new(store.clone()), &config()).unwrap_err();
        assert!(matches!(err, ConfigError::CorruptStore { .. }));
        assert_eq!(
            store.load().unwrap().unwrap(),
            b"{ definitely not json".to_vec(),
            "corrupt content must not be overwritten"
        );
    }

    #[test]
    fn startup_falls_back_to_first_application() {
        let (mut manager, store) = empty_manager();
        manager.create_application("shop", "Shop", ApplicationConfig::default()).unwrap();
        manager.create_application("blog", "Blog", ApplicationConfig::default()).unwrap();
        drop(manager);

        let reopened = ConfigManager::with_store(Box::new(store), &config()).unwrap();
        assert_eq!(reopened.current_application(), "shop");
    }

    #[test]
    fn startup_prefers_configured_default() {
        let (mut manager, store) = empty_manager();
        manager.create_application("shop", "Shop", ApplicationConfig::default()).unwrap();
        manager.create_application("blog", "Blog", ApplicationConfig::default()).unwrap();
        drop(manager);

        let config = RuntimeConfig {
            default_application: "blog".to_owned(),
            ..config()
        };
        let reopened = ConfigManager::with_store(Box::new(store), &config).unwrap();
        assert_eq!(reopened.current_application(), "blog");
    }

    #[test]
    fn save_then_load_is_lossless() {
        let (mut manager, store) = manager_with_shop();
        manager.clone_application("shop", "shop_eu", "Shop EU").unwrap();
        manager
            .create_application_from_template("enterprise", "corp", "Corp")
            .unwrap();
        manager
            .update_balance_cache("shop", Mode::Test, json!({ "wallets": [{ "currency": "dzd", "balance": 10 }] }))
            .unwrap();
        manager.set_current_mode("corp", "live").unwrap();

        let reopened = ConfigManager::with_store(Box::new(store), &config()).unwrap();
        assert_eq!(reopened.applications(), manager.applications());
    }

    // ── Create ───────────────────────────────────────────────────────

    #[test]
    fn create_starts_in_test_mode_with_limits() {
        let (manager, _) = manager_with_shop();
        let app = manager.application("shop").unwrap();
        assert_eq!(app.name, "Shop");
        assert_eq!(app.current_mode, Mode::Test);
        assert_eq!(app.settings.safety_limits, SafetyLimits::default());
        assert!(app.last_used.is_some());
    }

    #[test]
    fn create_persists_immediately() {
        let (manager, store) = manager_with_shop();
        assert_eq!(stored(&store), *manager.applications());
    }

    #[test]
    fn create_does_not_fabricate_keys() {
        let (manager, _) = manager_with_shop();
        assert_eq!(manager.api_key("shop", Mode::Test).unwrap(), Some(SHOP_TEST_KEY));
        assert_eq!(manager.api_key("shop", Mode::Live).unwrap(), None);
    }

    #[test]
    fn duplicate_create_leaves_registry_unchanged() {
        let (mut manager, store) = manager_with_shop();
        let before = manager.applications().clone();

        let err = manager
            .create_application("shop", "Other", ApplicationConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { ref id } if id == "shop"));
        assert_eq!(*manager.applications(), before);
        assert_eq!(stored(&store), before);
    }

    #[test]
    fn create_rejects_invalid_ids() {
        let (mut manager, _) = empty_manager();
        for bad in ["", "My-Shop", "shop!", "Shop"] {
            let err = manager
                .create_application(bad, "x", ApplicationConfig::default())
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidId { .. }), "{bad}");
        }
        assert!(manager.applications().is_empty());
    }

    #[test]
    fn failed_save_leaves_state_unchanged() {
        let (mut manager, store) = manager_with_shop();
        let before = manager.applications().clone();
        store.fail_writes(true).unwrap();

        let err = manager
            .create_application("blog", "Blog", ApplicationConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Storage(_)));
        assert!(!manager.application_exists("blog"));
        assert_eq!(*manager.applications(), before);

        let err = manager.set_current_application("shop").unwrap_err();
        assert!(matches!(err, ConfigError::Storage(_)));
        assert_eq!(*manager.applications(), before);
    }

    #[test]
    fn create_from_template_uses_template_settings() {
        let (mut manager, _) = empty_manager();
        manager
            .create_application_from_template("ecommerce", "store", "Store")
            .unwrap();
        let app = manager.application("store").unwrap();
        assert_eq!(app.settings.auto_expire_minutes, 60);
        assert_eq!(app.settings.safety_limits.max_daily_payments, 200);
        assert_eq!(app.metadata["template"], "ecommerce");
        assert!(app.test.api_key.is_none());
        assert!(app.live.api_key.is_none());
    }

    #[test]
    fn create_from_unknown_template_fails() {
        let (mut manager, _) = empty_manager();
        let err = manager
            .create_application_from_template("premium", "store", "Store")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TemplateNotFound { ref id } if id == "premium"));
        assert!(manager.applications().is_empty());
    }

    // ── Update ───────────────────────────────────────────────────────

    #[test]
    fn update_merges_nested_settings() {
        let (mut manager, _) = manager_with_shop();
        manager
            .update_application(
                "shop",
                json!({ "settings": { "safety_limits": { "max_daily_payments": 5 } } }),
            )
            .unwrap();

        let limits = manager.application("shop").unwrap().settings.safety_limits;
        assert_eq!(limits.max_daily_payments, 5);
        assert_eq!(limits.max_single_payment, 100_000);
        assert_eq!(limits.max_daily_volume, 500_000);
    }

    #[test]
    fn update_overwrites_scalars_and_keeps_the_rest() {
        let (mut manager, _) = manager_with_shop();
        manager
            .update_application(
                "shop",
                json!({ "name": "Shop DZ", "live": { "webhook_url": "https://shop.example/hook" } }),
            )
            .unwrap();

        let app = manager.application("shop").unwrap();
        assert_eq!(app.name, "Shop DZ");
        assert_eq!(app.live.webhook_url.as_deref(), Some("https://shop.example/hook"));
        assert_eq!(app.test.api_key.as_deref(), Some(SHOP_TEST_KEY));
    }

    #[test]
    fn update_replaces_tag_lists() {
        let (mut manager, _) = empty_manager();
        manager
            .create_application_from_template("basic", "shop", "Shop")
            .unwrap();
        manager
            .update_application("shop", json!({ "metadata": { "tags": ["archived"] } }))
            .unwrap();
        let app = manager.application("shop").unwrap();
        assert_eq!(app.metadata["tags"], json!(["archived"]));
        assert_eq!(app.metadata["template"], "basic");
    }

    #[test]
    fn update_unknown_application_fails() {
        let (mut manager, _) = empty_manager();
        let err = manager
            .update_application("ghost", json!({ "name": "x" }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn invalid_updates_are_rejected_before_mutation() {
        let (mut manager, store) = manager_with_shop();
        let before = manager.applications().clone();

        for patch in [
            json!("rename"),
            json!({ "colour": "blue" }),
            json!({ "current_mode": "staging" }),
            json!({ "settings": { "auto_expire_minutes": "soon" } }),
            json!({ "settings": { "safety_limits": { "max_daily_paymentz": 1 } } }),
            json!({ "test": { "balance_cache": { "wallets": [{ "currency": "dzd", "balance": 999_999 }] } } }),
            json!({ "live": { "api_key": "live_sk_new", "last_balance_check": "2024-01-01T00:00:00Z" } }),
            json!({ "created_at": "1999-01-01T00:00:00Z" }),
            json!({ "last_used": null }),
        ] {
            let err = manager.update_application("shop", patch.clone()).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidUpdate { .. }), "{patch}");
        }
        assert_eq!(*manager.applications(), before);
        assert_eq!(stored(&store), before);
    }

    // ── Delete ───────────────────────────────────────────────────────

    #[test]
    fn delete_current_clears_pointer() {
        let (mut manager, _) = manager_with_shop();
        manager.set_current_application("shop").unwrap();
        manager.delete_application("shop").unwrap();

        assert!(!manager.application_exists("shop"));
        assert_eq!(manager.current_application(), "");
    }

    #[test]
    fn delete_current_with_survivors_never_dangles() {
        let (mut manager, _) = manager_with_shop();
        manager.create_application("blog", "Blog", ApplicationConfig::default()).unwrap();
        manager.set_current_application("shop").unwrap();
        manager.delete_application("shop").unwrap();

        let current = manager.current_application();
        assert!(current.is_empty() || manager.application_exists(current));
        assert_ne!(current, "shop");
    }

    #[test]
    fn delete_other_keeps_pointer() {
        let (mut manager, _) = manager_with_shop();
        manager.create_application("blog", "Blog", ApplicationConfig::default()).unwrap();
        manager.set_current_application("shop").unwrap();
        manager.delete_application("blog").unwrap();
        assert_eq!(manager.current_application(), "shop");
    }

    #[test]
    fn delete_purges_only_own_artifacts() {
        let (mut manager, store) = manager_with_shop();
        store.add_artifact("payments_export_shop_test_20240101_120000.csv").unwrap();
        store.add_artifact("payments_export_shop_eu_test_20240101_120000.csv").unwrap();

        manager.delete_application("shop").unwrap();
        assert_eq!(
            store.artifacts().unwrap(),
            vec!["payments_export_shop_eu_test_20240101_120000.csv".to_owned()]
        );
        assert!(!stored(&store).contains("shop"));
    }

    #[test]
    fn failed_delete_keeps_application_and_artifacts() {
        let (mut manager, store) = manager_with_shop();
        store.add_artifact("payments_export_shop_test_20240101_120000.csv").unwrap();
        manager.set_current_application("shop").unwrap();
        store.fail_writes(true).unwrap();

        let err = manager.delete_application("shop").unwrap_err();
        assert!(matches!(err, ConfigError::Storage(_)));
        assert!(manager.application_exists("shop"));
        assert_eq!(manager.current_application(), "shop");
        assert!(stored(&store).contains("shop"));
        assert_eq!(
            store.artifacts().unwrap(),
            vec!["payments_export_shop_test_20240101_120000.csv".to_owned()]
        );
    }

    #[test]
    fn delete_unknown_application_fails() {
        let (mut manager, _) = manager_with_shop();
        let err = manager.delete_application("ghost").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { ref id } if id == "ghost"));
        assert!(manager.application_exists("shop"));
    }

    // ── Clone and export ─────────────────────────────────────────────

    fn shop_with_secrets() -> (ConfigManager, MemoryStore) {
        let (mut manager, store) = manager_with_shop();
        manager.set_api_key("shop", Mode::Live, SHOP_LIVE_KEY).unwrap();
        manager
            .update_application("shop", json!({ "test": { "webhook_secret": "whsec_123" } }))
            .unwrap();
        manager
            .update_balance_cache("shop", Mode::Test, json!({ "wallets": [] }))
            .unwrap();
        manager
            .update_balance_cache("shop", Mode::Live, json!({ "wallets": [] }))
            .unwrap();
        (manager, store)
    }

    #[test]
    fn clone_strips_keys_and_caches() {
        let (mut manager, _) = shop_with_secrets();
        manager.clone_application("shop", "shop_copy", "Shop Copy").unwrap();

        let copy = manager.application("shop_copy").unwrap();
        assert_eq!(copy.name, "Shop Copy");
        assert!(copy.last_used.is_none());
        for mode in Mode::ALL {
            let profile = copy.profile(mode);
            assert!(profile.api_key.is_none());
            assert!(profile.webhook_secret.is_none());
            assert!(profile.balance_cache.is_none());
            assert!(profile.last_balance_check.is_none());
        }
        assert_eq!(copy.settings, manager.application("shop").unwrap().settings);
        assert_eq!(manager.api_key("shop", Mode::Live).unwrap(), Some(SHOP_LIVE_KEY));
    }

    #[test]
    fn clone_checks_source_and_target() {
        let (mut manager, _) = manager_with_shop();
        manager.create_application("blog", "Blog", ApplicationConfig::default()).unwrap();

        let err = manager.clone_application("ghost", "new", "New").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        let err = manager.clone_application("shop", "blog", "Blog 2").unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { .. }));
        assert_eq!(manager.application("blog").unwrap().name, "Blog");
    }

    #[test]
    fn export_never_contains_keys() {
        let (manager, _) = shop_with_secrets();
        let exported = manager.export_application("shop").unwrap();
        let text = serde_json::to_string(&exported).unwrap();
        assert!(!text.contains(SHOP_TEST_KEY));
        assert!(!text.contains(SHOP_LIVE_KEY));
        assert!(!text.contains("whsec_123"));
        assert!(exported.test.balance_cache.is_none());
    }

    #[test]
    fn import_recreates_without_secrets() {
        let (mut manager, _) = shop_with_secrets();
        manager
            .update_application("shop", json!({ "test": { "default_success_url": "https://shop.example/ok" } }))
            .unwrap();
        manager.set_current_mode("shop", "live").unwrap();
        let exported = manager.export_application("shop").unwrap();

        manager.import_application("shop_imported", &exported).unwrap();
        let imported = manager.application("shop_imported").unwrap();
        assert_eq!(imported.name, "Shop");
        assert_eq!(imported.current_mode, Mode::Test);
        assert_eq!(
            imported.test.default_success_url.as_deref(),
            Some("https://shop.example/ok")
        );
        assert!(imported.test.api_key.is_none());

        let err = manager.import_application("shop", &exported).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists { .. }));
    }

    // ── Selection and modes ──────────────────────────────────────────

    #[test]
    fn set_current_application_bumps_last_used() {
        let (mut manager, _) = manager_with_shop();
        manager.clone_application("shop", "blog", "Blog").unwrap();
        assert!(manager.application("blog").unwrap().last_used.is_none());

        manager.set_current_application("blog").unwrap();
        assert_eq!(manager.current_application(), "blog");
        assert!(manager.application("blog").unwrap().last_used.is_some());
    }

    #[test]
    fn set_current_unknown_application_fails() {
        let (mut manager, _) = manager_with_shop();
        manager.set_current_application("shop").unwrap();
        let err = manager.set_current_application("ghost").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert_eq!(manager.current_application(), "shop");
    }

    #[test]
    fn set_current_mode_persists() {
        let (mut manager, store) = manager_with_shop();
        manager.set_current_mode("shop", "live").unwrap();
        assert_eq!(manager.current_mode(Some("shop")), Mode::Live);
        assert_eq!(stored(&store).get("shop").unwrap().current_mode, Mode::Live);
    }

    #[test]
    fn invalid_mode_leaves_stored_mode() {
        let (mut manager, _) = manager_with_shop();
        let err = manager.set_current_mode("shop", "staging").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode { ref mode } if mode == "staging"));
        assert_eq!(manager.application("shop").unwrap().current_mode, Mode::Test);
    }

    #[test]
    fn set_mode_on_unknown_application_fails() {
        let (mut manager, _) = empty_manager();
        let err = manager.set_current_mode("ghost", "live").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn global_override_beats_stored_mode() {
        let config = RuntimeConfig {
            global_mode_override: Some(Mode::Live),
            ..config()
        };
        let (mut manager, _) = empty_manager_with(&config);
        manager.create_application("shop", "Shop", ApplicationConfig::default()).unwrap();

        assert_eq!(manager.application("shop").unwrap().current_mode, Mode::Test);
        assert_eq!(manager.current_mode(Some("shop")), Mode::Live);
        assert_eq!(manager.current_mode(Some("ghost")), Mode::Live);

        manager.set_current_mode("shop", "test").unwrap();
        assert_eq!(manager.current_mode(Some("shop")), Mode::Live);
        assert_eq!(manager.process_context().global_mode_override, Some(Mode::Live));
    }

    #[test]
    fn no_override_uses_stored_mode() {
        let (manager, _) = manager_with_shop();
        assert_eq!(manager.current_mode(Some("shop")), Mode::Test);
        assert_eq!(manager.current_mode(Some("")), Mode::Test);
    }

    // ── Keys, credentials and balance cache ──────────────────────────

    #[test]
    fn set_api_key_touches_only_that_mode() {
        let (mut manager, _) = manager_with_shop();
        manager.set_api_key("shop", Mode::Live, SHOP_LIVE_KEY).unwrap();
        assert_eq!(manager.api_key("shop", Mode::Live).unwrap(), Some(SHOP_LIVE_KEY));
        assert_eq!(manager.api_key("shop", Mode::Test).unwrap(), Some(SHOP_TEST_KEY));

        manager.set_api_key("shop", Mode::Live, "").unwrap();
        assert_eq!(manager.api_key("shop", Mode::Live).unwrap(), None);
    }

    #[test]
    fn api_key_for_unknown_application_fails() {
        let (manager, _) = empty_manager();
        assert!(matches!(
            manager.api_key("ghost", Mode::Test).unwrap_err(),
            ConfigError::NotFound { .. }
        ));
    }

    #[test]
    fn credentials_carry_mode_endpoint() {
        let config = RuntimeConfig {
            test_base_url: "http://127.0.0.1:1/test".to_owned(),
            ..config()
        };
        let (mut manager, _) = empty_manager_with(&config);
        manager.create_application("shop", "Shop", shop_config()).unwrap();

        let creds = manager.credentials("shop", Mode::Test).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some(SHOP_TEST_KEY));
        assert_eq!(creds.base_url, "http://127.0.0.1:1/test");

        let creds = manager.credentials("shop", Mode::Live).unwrap();
        assert!(creds.api_key.is_none());
        assert_eq!(creds.base_url, crate::config::DEFAULT_LIVE_BASE_URL);
    }

    #[test]
    fn balance_cache_roundtrip() {
        let (mut manager, _) = manager_with_shop();
        assert!(manager.cached_balance("shop", Mode::Test).is_none());

        let payload = json!({ "livemode": false, "wallets": [{ "currency": "dzd", "balance": 1200 }] });
        manager
            .update_balance_cache("shop", Mode::Test, payload.clone())
            .unwrap();
        assert_eq!(manager.cached_balance("shop", Mode::Test), Some(&payload));
        assert!(manager.cached_balance("shop", Mode::Live).is_none());
        assert!(manager.application("shop").unwrap().test.last_balance_check.is_some());
        assert!(manager.cached_balance("ghost", Mode::Test).is_none());
    }

    #[test]
    fn balance_cache_for_unknown_application_fails() {
        let (mut manager, _) = empty_manager();
        let err = manager
            .update_balance_cache("ghost", Mode::Test, json!({}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    // ── Stats and validation ─────────────────────────────────────────

    #[test]
    fn stats_report_keys_and_caches() {
        let (mut manager, _) = manager_with_shop();
        manager
            .update_balance_cache("shop", Mode::Test, json!({ "wallets": [] }))
            .unwrap();
        let stats = manager.application_stats("shop").unwrap();
        assert!(stats.has_test_key);
        assert!(!stats.has_live_key);
        assert!(stats.test_balance_cached);
        assert!(!stats.live_balance_cached);
        assert!(stats.test_last_balance_check.is_some());
        assert!(stats.live_last_balance_check.is_none());
    }

    #[test]
    fn validation_lists_missing_fields() {
        let (mut manager, _) = manager_with_shop();
        let report = manager.validate_application("shop", Mode::Live).unwrap();
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Missing API key for live mode",
                "Missing webhook URL for live mode",
                "Missing default success URL for live mode",
            ]
        );

        manager
            .update_application(
                "shop",
                json!({ "test": {
                    "webhook_url": "https://shop.example/hook",
                    "default_success_url": "https://shop.example/ok"
                } }),
            )
            .unwrap();
        let report = manager.validate_application("shop", Mode::Test).unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    // ── Reset ────────────────────────────────────────────────────────

    #[test]
    fn reset_wipes_store_and_context() {
        let (mut manager, store) = manager_with_shop();
        manager.set_current_application("shop").unwrap();
        manager.reset_all_configuration().unwrap();

        assert!(manager.applications().is_empty());
        assert_eq!(manager.current_application(), "");
        assert!(store.load().unwrap().is_none());
    }

    // ── File-backed ──────────────────────────────────────────────────

    fn file_config(dir: &tempfile::TempDir) -> RuntimeConfig {
        RuntimeConfig {
            config_path: dir.path().join("applications.json"),
            ..config()
        }
    }

    #[test]
    fn open_seeds_and_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);
        {
            let mut manager = ConfigManager::open(&config).unwrap();
            assert_eq!(manager.application_ids(), vec!["main"]);
            manager.create_application("shop", "Shop", shop_config()).unwrap();
        }

        let reopened = ConfigManager::open(&config).unwrap();
        assert_eq!(reopened.application_ids(), vec!["main", "shop"]);
        assert_eq!(reopened.current_application(), "main");
        assert_eq!(
            reopened.api_key("shop", Mode::Test).unwrap(),
            Some(SHOP_TEST_KEY)
        );
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir);
        let _first = ConfigManager::open(&config).unwrap();

        let err = ConfigManager::open(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Storage(chargily_storage::StorageError::Locked { .. })
        ));
    }
}
