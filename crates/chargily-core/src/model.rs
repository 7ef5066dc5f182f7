//! Persisted data model: applications, per-mode profiles, and settings.
//!
//! The serde layout is the on-disk layout. Field order matters for display
//! stability, so struct fields follow the persisted document order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mode::Mode;

/// Credentials and defaults for one (application, mode) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeProfile {
    /// Secret API key, if configured.
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    /// Signing secret for incoming webhooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    pub default_success_url: Option<String>,
    pub default_failure_url: Option<String>,
    /// Last balance payload returned by the API, verbatim.
    pub balance_cache: Option<Value>,
    pub last_balance_check: Option<DateTime<Utc>>,
}

impl ModeProfile {
    /// Whether a non-empty API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Drop the cached balance and its timestamp together.
    pub fn clear_balance_cache(&mut self) {
        self.balance_cache = None;
        self.last_balance_check = None;
    }

    /// Remove everything that must not leave the store.
    pub fn strip_secrets(&mut self) {
        self.api_key = None;
        self.webhook_secret = None;
        self.clear_balance_cache();
    }
}

/// Hard limits applied to live payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyLimits {
    pub max_single_payment: u64,
    pub max_daily_payments: u64,
    pub max_daily_volume: u64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_single_payment: 100_000,
            max_daily_payments: 50,
            max_daily_volume: 500_000,
        }
    }
}

/// Webhook delivery preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub verify_signature: bool,
    pub retry_failed: bool,
    pub max_retries: u32,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_signature: true,
            retry_failed: true,
            max_retries: 3,
        }
    }
}

/// Per-application behavior settings.
///
/// Unknown keys are kept in `extra` so newer files survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub default_currency: String,
    pub auto_expire_minutes: u32,
    pub default_payment_method: String,
    pub require_confirmation: bool,
    pub enable_notifications: bool,
    #[serde(default)]
    pub safety_limits: SafetyLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_settings: Option<WebhookSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_currency: "dzd".to_owned(),
            auto_expire_minutes: 30,
            default_payment_method: "edahabia".to_owned(),
            require_confirmation: true,
            enable_notifications: true,
            safety_limits: SafetyLimits::default(),
            webhook_settings: None,
            extra: Map::new(),
        }
    }
}

/// A configured merchant account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub test: ModeProfile,
    pub live: ModeProfile,
    pub current_mode: Mode,
    pub settings: Settings,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Application {
    #[must_use]
    pub fn profile(&self, mode: Mode) -> &ModeProfile {
        match mode {
            Mode::Test => &self.test,
            Mode::Live => &self.live,
        }
    }

    pub fn profile_mut(&mut self, mode: Mode) -> &mut ModeProfile {
        match mode {
            Mode::Test => &mut self.test,
            Mode::Live => &mut self.live,
        }
    }

    /// Copy with credentials, webhook secrets and balance caches removed.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.test.strip_secrets();
        copy.live.strip_secrets();
        copy
    }
}

/// Caller-supplied fields for one mode when creating an application.
///
/// Missing fields stay `None`; nothing is filled in on the caller's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfileInput {
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub default_success_url: Option<String>,
    pub default_failure_url: Option<String>,
}

impl ProfileInput {
    /// Input carrying only an API key.
    #[must_use]
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub(crate) fn into_profile(self) -> ModeProfile {
        ModeProfile {
            api_key: self.api_key,
            webhook_url: self.webhook_url,
            webhook_secret: self.webhook_secret,
            default_success_url: self.default_success_url,
            default_failure_url: self.default_failure_url,
            balance_cache: None,
            last_balance_check: None,
        }
    }
}

/// Per-mode configuration and optional overrides for a new application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationConfig {
    pub test: ProfileInput,
    pub live: ProfileInput,
    /// Falls back to [`Settings::default`].
    pub settings: Option<Settings>,
    pub metadata: Map<String, Value>,
}

/// Summary of one application, as shown by `app stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStats {
    pub name: String,
    pub current_mode: Mode,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub has_test_key: bool,
    pub has_live_key: bool,
    pub test_balance_cached: bool,
    pub live_balance_cached: bool,
    pub test_last_balance_check: Option<DateTime<Utc>>,
    pub live_last_balance_check: Option<DateTime<Utc>>,
}

/// Outcome of checking one mode of an application for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// What the API gateway needs to authenticate one call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub application: String,
    pub mode: Mode,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("application", &self.application)
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}
