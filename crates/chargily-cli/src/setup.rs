//! First-run setup: validate API keys against the API, then register the
//! application.
//!
//! Each key is checked through a short-lived `temp_setup` application so the
//! normal credential path is exercised end to end. The temporary application
//! is always removed afterwards; a failure to remove it is logged and never
//! replaces the validation result.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chargily_core::model::{ApplicationConfig, ProfileInput};
use chargily_core::{ConfigManager, Mode};
use tracing::warn;

use crate::api::ChargilyClient;
use crate::output::{mode_badge, success};

/// Id of the throwaway application used while validating keys.
pub const TEMP_APPLICATION_ID: &str = "temp_setup";

/// Reject keys that do not carry the prefix of their mode.
///
/// # Errors
///
/// Returns `Err` if `key` does not start with `test_` / `live_`.
pub fn check_key_format(mode: Mode, key: &str) -> Result<()> {
    let prefix = format!("{mode}_");
    if !key.starts_with(&prefix) {
        bail!("{mode} API key must start with '{prefix}'");
    }
    Ok(())
}

/// Validate `key` for `mode` with a balance request.
///
/// # Errors
///
/// Returns `Err` if the temporary application cannot be created or the API
/// rejects the key.
pub async fn validate_key(
    manager: &mut ConfigManager,
    timeout: Duration,
    mode: Mode,
    key: &str,
) -> Result<()> {
    if manager.application_exists(TEMP_APPLICATION_ID) {
        remove_temp_application(manager);
    }

    let mut config = ApplicationConfig::default();
    match mode {
        Mode::Test => config.test = ProfileInput::with_api_key(key),
        Mode::Live => config.live = ProfileInput::with_api_key(key),
    }
    manager
        .create_application(TEMP_APPLICATION_ID, "Setup Temp", config)
        .context("failed to create temporary setup application")?;

    let outcome = fetch_balance(manager, timeout, mode).await;
    remove_temp_application(manager);

    outcome.with_context(|| format!("{mode} API key validation failed"))?;
    success(&format!("{} API key is valid", mode_badge(mode)));
    Ok(())
}

async fn fetch_balance(manager: &ConfigManager, timeout: Duration, mode: Mode) -> Result<()> {
    let credentials = manager.credentials(TEMP_APPLICATION_ID, mode)?;
    let client = ChargilyClient::new(credentials, timeout)?;
    client.balance().await?;
    Ok(())
}

fn remove_temp_application(manager: &mut ConfigManager) {
    if let Err(e) = manager.delete_application(TEMP_APPLICATION_ID) {
        warn!(error = %e, "failed to remove temporary setup application");
    }
}
