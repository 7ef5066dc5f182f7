//! Runtime configuration for the Chargily CLI.
//!
//! Loaded once from `CHARGILY_*` environment variables at process start and
//! treated as immutable afterwards.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::mode::Mode;
use crate::model::ProfileInput;

/// Default test-mode endpoint.
pub const DEFAULT_TEST_BASE_URL: &str = "https://pay.chargily.net/test/api/v2";
/// Default live-mode endpoint.
pub const DEFAULT_LIVE_BASE_URL: &str = "https://pay.chargily.net/api/v2";
/// Application made current at startup when it exists.
pub const DEFAULT_APPLICATION: &str = "main";

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Backing store for the application registry.
    pub config_path: PathBuf,
    /// Preferred current application at startup.
    pub default_application: String,
    /// Forces every application into one mode when set.
    pub global_mode_override: Option<Mode>,
    /// Raw `CHARGILY_GLOBAL_MODE` value that was not a mode, if any.
    pub rejected_global_mode: Option<String>,
    pub test_base_url: String,
    pub live_base_url: String,
    /// Gateway request timeout.
    pub timeout: Duration,
    /// How long a cached balance is shown without refetching.
    pub balance_cache_ttl: Duration,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Credentials for the seeded `main` application on first run.
    pub seed: SeedCredentials,
}

/// Optional credentials and URLs for the seeded application, per mode.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SeedCredentials {
    pub test: ProfileInput,
    pub live: ProfileInput,
}

impl fmt::Debug for SeedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedCredentials")
            .field("test_api_key", &self.test.api_key.as_ref().map(|_| "<redacted>"))
            .field("live_api_key", &self.live.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHARGILY_CONFIG_PATH`: store file (default: `$HOME/.chargily/applications.json`)
    /// - `CHARGILY_DEFAULT_APP`: application made current at startup (default: `main`)
    /// - `CHARGILY_GLOBAL_MODE`: `test` or `live`, case-insensitive (default: unset)
    /// - `CHARGILY_TEST_BASE_URL` / `CHARGILY_LIVE_BASE_URL`: API endpoints
    /// - `CHARGILY_TIMEOUT`: request timeout in seconds (default: `30`)
    /// - `CHARGILY_BALANCE_CACHE_TTL`: seconds a cached balance stays fresh (default: `300`)
    /// - `CHARGILY_LOG_LEVEL`: log filter (default: `warn`)
    /// - `CHARGILY_MAIN_{TEST,LIVE}_{KEY,WEBHOOK,SUCCESS_URL,FAILURE_URL}`:
    ///   seed values for the first-run `main` application
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_path = var("CHARGILY_CONFIG_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| ".".to_owned());
                PathBuf::from(home).join(".chargily").join("applications.json")
            },
            PathBuf::from,
        );

        let (global_mode_override, rejected_global_mode) = match var("CHARGILY_GLOBAL_MODE") {
            None => (None, None),
            Some(raw) => match raw.trim().to_ascii_lowercase().parse::<Mode>() {
                Ok(mode) => (Some(mode), None),
                Err(_) => (None, Some(raw)),
            },
        };

        let seconds = |name: &str, default: u64| {
            var(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(default)
        };

        let seed_profile = |mode: &str| ProfileInput {
            api_key: var(&format!("CHARGILY_MAIN_{mode}_KEY")),
            webhook_url: var(&format!("CHARGILY_MAIN_{mode}_WEBHOOK")),
            webhook_secret: None,
            default_success_url: var(&format!("CHARGILY_MAIN_{mode}_SUCCESS_URL")),
            default_failure_url: var(&format!("CHARGILY_MAIN_{mode}_FAILURE_URL")),
        };

        Self {
            config_path,
            default_application: var("CHARGILY_DEFAULT_APP")
                .unwrap_or_else(|| DEFAULT_APPLICATION.to_owned()),
            global_mode_override,
            rejected_global_mode,
            test_base_url: var("CHARGILY_TEST_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TEST_BASE_URL.to_owned()),
            live_base_url: var("CHARGILY_LIVE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LIVE_BASE_URL.to_owned()),
            timeout: Duration::from_secs(seconds("CHARGILY_TIMEOUT", 30)),
            balance_cache_ttl: Duration::from_secs(seconds("CHARGILY_BALANCE_CACHE_TTL", 300)),
            log_level: var("CHARGILY_LOG_LEVEL").unwrap_or_else(|| "warn".to_owned()),
            seed: SeedCredentials {
                test: seed_profile("TEST"),
                live: seed_profile("LIVE"),
            },
        }
    }
}
