//! Chargily CLI: manage Chargily Pay applications, API keys and test/live
//! modes from the terminal.
//!
//! Configuration lives in a single JSON store (see `chargily-core`); API
//! calls go through [`api::ChargilyClient`].

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod api;
mod output;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chargily_core::model::{Application, ApplicationConfig, ProfileInput};
use chargily_core::{ConfigError, ConfigManager, Mode, RuntimeConfig};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiError, ChargilyClient};
use crate::output::{
    BOLD, CYAN, DIM, RED, RESET, YELLOW, failure, header, hint, kv_line, mode_badge, or_none,
    print_balance, print_json, success, warning, yes_no,
};

// ── CLI structure ────────────────────────────────────────────────────

/// Chargily Pay, from the command line.
#[derive(Parser)]
#[command(
    name = "chargily",
    version,
    about = "Chargily CLI: manage applications, API keys and test/live modes",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         CHARGILY_CONFIG_PATH   Configuration file (default: ~/.chargily/applications.json)\n  \
         CHARGILY_DEFAULT_APP   Application selected at startup (default: main)\n  \
         CHARGILY_GLOBAL_MODE   Force every application into test or live mode\n  \
         CHARGILY_LOG_LEVEL     Log filter when RUST_LOG is unset (default: warn)\n\n\
         {DIM}Examples:{RESET}\n  \
         chargily setup --test-key test_sk_... --live-key live_sk_...\n  \
         chargily app create shop --name \"My Shop\" --test-key test_sk_...\n  \
         chargily mode switch live --app shop --yes\n  \
         chargily balance --all"
    ),
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current application, mode and store location.
    Status,
    /// List the built-in application templates.
    Templates,
    /// Application management.
    App {
        #[command(subcommand)]
        action: AppCommands,
    },
    /// Show or switch the test/live mode of an application.
    Mode {
        #[command(subcommand)]
        action: ModeCommands,
    },
    /// API key management.
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Show the account balance.
    Balance {
        /// Application id (default: current application).
        #[arg(long)]
        app: Option<String>,
        /// Ignore the cached balance and ask the API.
        #[arg(long)]
        fresh: bool,
        /// Show the balance of every application.
        #[arg(long, conflicts_with = "app")]
        all: bool,
    },
    /// Send a raw request to the Chargily Pay API.
    Request {
        #[arg(value_enum)]
        method: Method,
        /// Endpoint path, e.g. `/customers`.
        endpoint: String,
        /// JSON request body (POST only).
        #[arg(long)]
        data: Option<String>,
        /// Application id (default: current application).
        #[arg(long)]
        app: Option<String>,
    },
    /// Validate API keys and register the main application.
    Setup {
        /// Application id.
        #[arg(long, default_value = "main")]
        id: String,
        /// Application name.
        #[arg(long, default_value = "Main Business")]
        name: String,
        /// Test mode API key (`test_...`).
        #[arg(long, env = "CHARGILY_SETUP_TEST_KEY", hide_env_values = true)]
        test_key: String,
        /// Live mode API key (`live_...`).
        #[arg(long, env = "CHARGILY_SETUP_LIVE_KEY", hide_env_values = true)]
        live_key: String,
        /// Store the keys without checking them against the API.
        #[arg(long)]
        skip_validation: bool,
    },
    /// Delete every application and start over.
    Reset {
        /// Must be exactly `RESET`.
        #[arg(long)]
        confirm: Option<String>,
    },
}

#[derive(Subcommand)]
enum AppCommands {
    /// List all applications.
    List,
    /// Show one application.
    Show {
        /// Application id (default: current application).
        id: Option<String>,
        /// Print the exported JSON instead.
        #[arg(long)]
        json: bool,
    },
    /// Create an application.
    Create {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        test_key: Option<String>,
        #[arg(long)]
        live_key: Option<String>,
        #[arg(long)]
        test_webhook_url: Option<String>,
        #[arg(long)]
        live_webhook_url: Option<String>,
        #[arg(long)]
        test_success_url: Option<String>,
        #[arg(long)]
        test_failure_url: Option<String>,
        #[arg(long)]
        live_success_url: Option<String>,
        #[arg(long)]
        live_failure_url: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Tag recorded in the metadata (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Create an application from a built-in template.
    FromTemplate {
        template: String,
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Copy an application's settings and URLs (never its keys).
    Clone {
        source: String,
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Merge a JSON patch into an application.
    Update {
        id: String,
        /// JSON object, e.g. `{"settings":{"auto_expire_minutes":45}}`.
        #[arg(long)]
        patch: String,
    },
    /// Delete an application.
    Delete {
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Mark an application as used (updates `last_used`).
    ///
    /// Selection is per run; use `--app` or `CHARGILY_DEFAULT_APP`.
    Touch { id: String },
    /// Export an application without secrets.
    Export {
        id: String,
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an exported application.
    Import { id: String, file: PathBuf },
    /// Show usage statistics.
    Stats {
        /// Application id (default: every application).
        id: Option<String>,
    },
    /// Check that an application is ready for payments.
    Validate {
        /// Application id (default: current application).
        id: Option<String>,
        /// Mode to check (default: the application's effective mode).
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModeCommands {
    /// Show the effective mode.
    Show {
        #[arg(long)]
        app: Option<String>,
    },
    /// Switch to `test` or `live`.
    Switch {
        mode: String,
        #[arg(long)]
        app: Option<String>,
        /// Confirm switching to live mode.
        #[arg(long)]
        yes: bool,
        /// Do not test the API connection afterwards.
        #[arg(long)]
        skip_check: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store an API key; an empty key removes it.
    Set {
        mode: String,
        key: String,
        #[arg(long)]
        app: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Get,
    Post,
    Delete,
}

// ── Main ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    init_tracing(&config.log_level, cli.log_json);

    if let Some(raw) = &config.rejected_global_mode {
        warn!(value = %raw, "ignoring invalid CHARGILY_GLOBAL_MODE, expected 'test' or 'live'");
    }

    match run(&config, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            if let Some(action) = suggested_action(&e) {
                eprintln!("  {DIM}→ {action}{RESET}");
            }
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The first remedial hint found in the error chain.
fn suggested_action(e: &anyhow::Error) -> Option<&'static str> {
    e.chain().find_map(|cause| {
        cause
            .downcast_ref::<ConfigError>()
            .map(ConfigError::suggested_action)
            .or_else(|| cause.downcast_ref::<ApiError>().map(ApiError::suggested_action))
    })
}

async fn run(config: &RuntimeConfig, cmd: Commands) -> Result<()> {
    let mut manager = ConfigManager::open(config).context("failed to load configuration")?;
    let m = &mut manager;

    match cmd {
        Commands::Status => cmd_status(m, config),
        Commands::Templates => {
            cmd_templates(m);
            Ok(())
        }
        Commands::App { action } => cmd_app(m, action),
        Commands::Mode { action } => cmd_mode(m, config, action).await,
        Commands::Key { action } => cmd_key(m, action),
        Commands::Balance { app, fresh, all } => {
            cmd_balance(m, config, app.as_deref(), fresh, all).await
        }
        Commands::Request {
            method,
            endpoint,
            data,
            app,
        } => cmd_request(m, config, method, &endpoint, data.as_deref(), app.as_deref()).await,
        Commands::Setup {
            id,
            name,
            test_key,
            live_key,
            skip_validation,
        } => cmd_setup(m, config, &id, &name, &test_key, &live_key, skip_validation).await,
        Commands::Reset { confirm } => cmd_reset(m, confirm.as_deref()),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// `requested`, or the current application if none was given.
fn resolve_app(manager: &ConfigManager, requested: Option<&str>) -> Result<String> {
    let id = match requested {
        Some(id) => id.to_owned(),
        None => {
            let current = manager.current_application();
            if current.is_empty() {
                bail!(
                    "no application selected; pass `--app <id>`, set CHARGILY_DEFAULT_APP, or run `chargily setup`"
                );
            }
            current.to_owned()
        }
    };
    manager.application(&id)?;
    Ok(id)
}

fn parse_mode(raw: &str) -> Result<Mode> {
    Ok(raw.parse::<Mode>()?)
}

fn client_for(
    manager: &ConfigManager,
    config: &RuntimeConfig,
    id: &str,
    mode: Mode,
) -> Result<ChargilyClient> {
    let credentials = manager.credentials(id, mode)?;
    Ok(ChargilyClient::new(credentials, config.timeout)?)
}

fn key_status(app: &Application, mode: Mode) -> String {
    if app.profile(mode).has_api_key() {
        "configured".to_owned()
    } else {
        format!("{YELLOW}not set{RESET}")
    }
}

fn format_time(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map_or_else(
        || "never".to_owned(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

// ── Status ───────────────────────────────────────────────────────────

fn cmd_status(manager: &ConfigManager, config: &RuntimeConfig) -> Result<()> {
    header("◈", "Chargily Status");
    kv_line("Store", &manager.location());
    kv_line("Applications", &manager.applications().len().to_string());

    let current = manager.current_application();
    if current.is_empty() {
        kv_line("Current app", "(none)");
    } else {
        let app = manager.application(current)?;
        kv_line("Current app", &format!("{current} ({})", app.name));
        kv_line("Mode", &mode_badge(manager.current_mode(None)));
    }
    if let Some(mode) = config.global_mode_override {
        kv_line("Global override", &mode_badge(mode));
    }
    println!();

    if current.is_empty() {
        warning("No application is selected.");
        hint("Pass `--app <id>`, set CHARGILY_DEFAULT_APP, or run `chargily setup`.");
    }
    Ok(())
}

fn cmd_templates(manager: &ConfigManager) {
    header("▤", "Templates");
    for template in manager.templates() {
        println!("  {BOLD}{CYAN}{:<14}{RESET} {}", template.id, template.name);
        println!("  {DIM}{:<14} {}{RESET}", "", template.description);
        let limits = template.settings.safety_limits;
        println!(
            "  {DIM}{:<14} expires after {} min, max payment {}, {} payments/day{RESET}",
            "", template.settings.auto_expire_minutes, limits.max_single_payment, limits.max_daily_payments
        );
    }
    println!();
    hint("Create one with `chargily app from-template <template> <id> --name <name>`.");
}

// ── Applications ─────────────────────────────────────────────────────

fn cmd_app(manager: &mut ConfigManager, action: AppCommands) -> Result<()> {
    match action {
        AppCommands::List => {
            app_list(manager);
            Ok(())
        }
        AppCommands::Show { id, json } => app_show(manager, id.as_deref(), json),
        AppCommands::Create {
            id,
            name,
            test_key,
            live_key,
            test_webhook_url,
            live_webhook_url,
            test_success_url,
            test_failure_url,
            live_success_url,
            live_failure_url,
            description,
            tags,
        } => {
            let mut metadata = Map::new();
            if let Some(description) = description {
                metadata.insert("description".to_owned(), Value::from(description));
            }
            if !tags.is_empty() {
                metadata.insert("tags".to_owned(), json!(tags));
            }
            let config = ApplicationConfig {
                test: ProfileInput {
                    api_key: test_key,
                    webhook_url: test_webhook_url,
                    webhook_secret: None,
                    default_success_url: test_success_url,
                    default_failure_url: test_failure_url,
                },
                live: ProfileInput {
                    api_key: live_key,
                    webhook_url: live_webhook_url,
                    webhook_secret: None,
                    default_success_url: live_success_url,
                    default_failure_url: live_failure_url,
                },
                settings: None,
                metadata,
            };
            manager.create_application(&id, &name, config)?;
            success(&format!("Created application '{id}' ({name})"));
            hint(&format!("Select it with `--app {id}` or CHARGILY_DEFAULT_APP={id}."));
            Ok(())
        }
        AppCommands::FromTemplate { template, id, name } => {
            manager.create_application_from_template(&template, &id, &name)?;
            success(&format!("Created application '{id}' from template '{template}'"));
            hint(&format!("Add keys with `chargily key set test <key> --app {id}`."));
            Ok(())
        }
        AppCommands::Clone { source, id, name } => {
            manager.clone_application(&source, &id, &name)?;
            success(&format!("Cloned '{source}' into '{id}'"));
            hint("API keys are not copied; set them with `chargily key set`.");
            Ok(())
        }
        AppCommands::Update { id, patch } => {
            let patch: Value =
                serde_json::from_str(&patch).context("--patch must be valid JSON")?;
            manager.update_application(&id, patch)?;
            success(&format!("Updated application '{id}'"));
            Ok(())
        }
        AppCommands::Delete { id, yes } => {
            if !yes {
                bail!("refusing to delete '{id}' without --yes");
            }
            let was_current = manager.current_application() == id;
            manager.delete_application(&id)?;
            success(&format!("Deleted application '{id}'"));
            if was_current {
                warning("The deleted application was current; no application is selected now.");
                hint("Pass `--app <id>` or set CHARGILY_DEFAULT_APP to pick another one.");
            }
            Ok(())
        }
        AppCommands::Touch { id } => {
            manager.set_current_application(&id)?;
            let mode = manager.current_mode(Some(&id));
            success(&format!("Marked '{id}' as used ({})", mode_badge(mode)));
            hint(&format!("Select it with `--app {id}` or CHARGILY_DEFAULT_APP={id}."));
            Ok(())
        }
        AppCommands::Export { id, output } => {
            let exported = manager.export_application(&id)?;
            let mut text = serde_json::to_string_pretty(&exported)
                .context("failed to serialize application")?;
            text.push('\n');
            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    success(&format!("Exported '{id}' to {}", path.display()));
                }
                None => print!("{text}"),
            }
            Ok(())
        }
        AppCommands::Import { id, file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let exported: Application = serde_json::from_str(&text)
                .with_context(|| format!("{} is not an exported application", file.display()))?;
            manager.import_application(&id, &exported)?;
            success(&format!("Imported '{id}' ({})", exported.name));
            hint("Imported applications start in test mode without API keys.");
            Ok(())
        }
        AppCommands::Stats { id } => app_stats(manager, id.as_deref()),
        AppCommands::Validate { id, mode } => app_validate(manager, id.as_deref(), mode.as_deref()),
    }
}

fn app_list(manager: &ConfigManager) {
    header("▤", "Applications");
    if manager.applications().is_empty() {
        println!("  {DIM}(no applications){RESET}");
        println!();
        hint("Run `chargily setup` to create one.");
        return;
    }
    let current = manager.current_application();
    for (id, app) in manager.applications() {
        let marker = if id == current { "▸" } else { " " };
        println!(
            "  {CYAN}{marker}{RESET} {BOLD}{id:<16}{RESET} {:<24} {}  {DIM}test key: {}, live key: {}{RESET}",
            app.name,
            mode_badge(manager.current_mode(Some(id))),
            yes_no(app.test.has_api_key()),
            yes_no(app.live.has_api_key()),
        );
    }
    println!();
}

fn app_show(manager: &ConfigManager, id: Option<&str>, as_json: bool) -> Result<()> {
    let id = resolve_app(manager, id)?;
    if as_json {
        let exported = manager.export_application(&id)?;
        print_json(&serde_json::to_value(exported).context("failed to serialize application")?);
        return Ok(());
    }

    let app = manager.application(&id)?;
    header("◈", &format!("Application '{id}'"));
    kv_line("Name", &app.name);
    kv_line("Mode", &mode_badge(manager.current_mode(Some(&id))));
    kv_line("Created", &format_time(Some(app.created_at)));
    kv_line("Last used", &format_time(app.last_used));
    if let Some(description) = app.metadata.get("description").and_then(Value::as_str) {
        kv_line("Description", description);
    }
    for mode in Mode::ALL {
        let profile = app.profile(mode);
        println!();
        println!("  {BOLD}{}{RESET}", mode_badge(mode));
        kv_line("API key", &key_status(app, mode));
        kv_line("Webhook URL", or_none(profile.webhook_url.as_deref()));
        kv_line("Success URL", or_none(profile.default_success_url.as_deref()));
        kv_line("Failure URL", or_none(profile.default_failure_url.as_deref()));
    }
    println!();
    let settings = &app.settings;
    kv_line("Currency", &settings.default_currency);
    kv_line("Payment method", &settings.default_payment_method);
    kv_line("Auto-expire", &format!("{} min", settings.auto_expire_minutes));
    kv_line("Confirmation", &yes_no(settings.require_confirmation));
    kv_line(
        "Max payment",
        &settings.safety_limits.max_single_payment.to_string(),
    );
    println!();
    Ok(())
}

fn app_stats(manager: &ConfigManager, id: Option<&str>) -> Result<()> {
    let ids = match id {
        Some(id) => vec![id.to_owned()],
        None => manager.application_ids(),
    };
    header("▤", "Application Stats");
    for id in ids {
        let stats = manager.application_stats(&id)?;
        println!("  {BOLD}{id}{RESET} {DIM}({}){RESET}", stats.name);
        kv_line("Mode", &mode_badge(stats.current_mode));
        kv_line("Created", &format_time(Some(stats.created_at)));
        kv_line("Last used", &format_time(stats.last_used));
        kv_line(
            "Keys",
            &format!(
                "test {}, live {}",
                yes_no(stats.has_test_key),
                yes_no(stats.has_live_key)
            ),
        );
        kv_line(
            "Balance cached",
            &format!(
                "test {}, live {}",
                yes_no(stats.test_balance_cached),
                yes_no(stats.live_balance_cached)
            ),
        );
        println!();
    }
    Ok(())
}

fn app_validate(manager: &ConfigManager, id: Option<&str>, mode: Option<&str>) -> Result<()> {
    let id = resolve_app(manager, id)?;
    let mode = match mode {
        Some(raw) => parse_mode(raw)?,
        None => manager.current_mode(Some(&id)),
    };
    let report = manager.validate_application(&id, mode)?;
    if report.valid {
        success(&format!("'{id}' is ready for {} payments", mode_badge(mode)));
    } else {
        warning(&format!("'{id}' is incomplete for {mode} mode:"));
        for error in &report.errors {
            println!("    {DIM}•{RESET} {error}");
        }
    }
    Ok(())
}

// ── Mode ─────────────────────────────────────────────────────────────

async fn cmd_mode(
    manager: &mut ConfigManager,
    config: &RuntimeConfig,
    action: ModeCommands,
) -> Result<()> {
    match action {
        ModeCommands::Show { app } => {
            let id = resolve_app(manager, app.as_deref())?;
            let stored = manager.application(&id)?.current_mode;
            let effective = manager.current_mode(Some(&id));
            kv_line("Application", &id);
            kv_line("Mode", &mode_badge(effective));
            if effective != stored {
                kv_line("Stored mode", &mode_badge(stored));
                hint("CHARGILY_GLOBAL_MODE overrides the stored mode.");
            }
            Ok(())
        }
        ModeCommands::Switch {
            mode,
            app,
            yes,
            skip_check,
        } => mode_switch(manager, config, &mode, app.as_deref(), yes, skip_check).await,
    }
}

async fn mode_switch(
    manager: &mut ConfigManager,
    config: &RuntimeConfig,
    raw_mode: &str,
    app: Option<&str>,
    yes: bool,
    skip_check: bool,
) -> Result<()> {
    let mode = parse_mode(raw_mode)?;
    let id = resolve_app(manager, app)?;

    if mode.is_live() {
        if !yes {
            bail!("switching '{id}' to live mode processes real payments; pass --yes to confirm");
        }
        if manager.api_key(&id, Mode::Live)?.is_none() {
            bail!(
                "'{id}' has no live API key; run `chargily key set live <key> --app {id}` first"
            );
        }
    }

    manager.set_current_mode(&id, mode.as_str())?;
    success(&format!("'{id}' is now in {} mode", mode_badge(mode)));
    if let Some(forced) = config.global_mode_override.filter(|f| *f != mode) {
        warning(&format!(
            "CHARGILY_GLOBAL_MODE={forced} is set and overrides this choice."
        ));
    }
    if mode.is_live() {
        println!("  {RED}{BOLD}Live payments will charge real money.{RESET}");
    }

    if skip_check {
        return Ok(());
    }
    let client = client_for(manager, config, &id, mode)?;
    let check = client.test_connection().await;
    if check.success {
        success(&check.message);
        if let Some(data) = check.data {
            manager.update_balance_cache(&id, mode, data)?;
        }
    } else {
        warning(&format!("API connection failed: {}", check.message));
    }
    Ok(())
}

// ── Keys ─────────────────────────────────────────────────────────────

fn cmd_key(manager: &mut ConfigManager, action: KeyCommands) -> Result<()> {
    match action {
        KeyCommands::Set { mode, key, app } => {
            let mode = parse_mode(&mode)?;
            let id = resolve_app(manager, app.as_deref())?;
            if !key.is_empty() && setup::check_key_format(mode, &key).is_err() {
                warning(&format!("{mode} keys usually start with '{mode}_'"));
            }
            manager.set_api_key(&id, mode, &key)?;
            if key.is_empty() {
                success(&format!("Removed the {mode} API key of '{id}'"));
            } else {
                success(&format!("Stored the {mode} API key of '{id}'"));
            }
            Ok(())
        }
    }
}

// ── Balance ──────────────────────────────────────────────────────────

async fn cmd_balance(
    manager: &mut ConfigManager,
    config: &RuntimeConfig,
    app: Option<&str>,
    fresh: bool,
    all: bool,
) -> Result<()> {
    if !all {
        let id = resolve_app(manager, app)?;
        return show_balance(manager, config, &id, fresh).await;
    }

    let ids = manager.application_ids();
    if ids.is_empty() {
        warning("No applications configured.");
        return Ok(());
    }
    for id in ids {
        if let Err(e) = show_balance(manager, config, &id, fresh).await {
            failure(&format!("{id}: {e:#}"));
            println!();
        }
    }
    Ok(())
}

async fn show_balance(
    manager: &mut ConfigManager,
    config: &RuntimeConfig,
    id: &str,
    fresh: bool,
) -> Result<()> {
    let mode = manager.current_mode(Some(id));
    header("◈", &format!("Balance of '{id}' ({})", mode_badge(mode)));

    if !fresh {
        let checked = manager.application(id)?.profile(mode).last_balance_check;
        if let (Some(cached), Some(checked)) = (manager.cached_balance(id, mode), checked) {
            let age = Utc::now().signed_duration_since(checked);
            let ttl = chrono::Duration::from_std(config.balance_cache_ttl)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if age >= chrono::Duration::zero() && age < ttl {
                print_balance(cached);
                println!(
                    "  {DIM}cached {}s ago, use --fresh to refresh{RESET}",
                    age.num_seconds()
                );
                println!();
                return Ok(());
            }
        }
    }

    let client = client_for(manager, config, id, mode)?;
    let payload = client.balance().await?;
    print_balance(&payload);
    println!();
    manager.update_balance_cache(id, mode, payload)?;
    info!(application = %id, mode = %mode, "balance refreshed");
    Ok(())
}

// ── Raw requests ─────────────────────────────────────────────────────

async fn cmd_request(
    manager: &ConfigManager,
    config: &RuntimeConfig,
    method: Method,
    endpoint: &str,
    data: Option<&str>,
    app: Option<&str>,
) -> Result<()> {
    let id = resolve_app(manager, app)?;
    let mode = manager.current_mode(Some(&id));
    let client = client_for(manager, config, &id, mode)?;

    let response = match method {
        Method::Get => client.get(endpoint).await?,
        Method::Delete => client.delete(endpoint).await?,
        Method::Post => {
            let body: Value = match data {
                Some(raw) => serde_json::from_str(raw).context("--data must be valid JSON")?,
                None => Value::Object(Map::new()),
            };
            client.post(endpoint, &body).await?
        }
    };
    print_json(&response);
    Ok(())
}

// ── Setup ────────────────────────────────────────────────────────────

async fn cmd_setup(
    manager: &mut ConfigManager,
    config: &RuntimeConfig,
    id: &str,
    name: &str,
    test_key: &str,
    live_key: &str,
    skip_validation: bool,
) -> Result<()> {
    header("◈", "Chargily Setup");
    setup::check_key_format(Mode::Test, test_key)?;
    setup::check_key_format(Mode::Live, live_key)?;

    if skip_validation {
        warning("Skipping API key validation.");
    } else {
        setup::validate_key(manager, config.timeout, Mode::Test, test_key).await?;
        setup::validate_key(manager, config.timeout, Mode::Live, live_key).await?;
    }

    if manager.application_exists(id) {
        manager.update_application(id, json!({ "name": name }))?;
        manager.set_api_key(id, Mode::Test, test_key)?;
        manager.set_api_key(id, Mode::Live, live_key)?;
        success(&format!("Updated application '{id}' ({name})"));
    } else {
        let app_config = ApplicationConfig {
            test: ProfileInput::with_api_key(test_key),
            live: ProfileInput::with_api_key(live_key),
            ..ApplicationConfig::default()
        };
        manager.create_application(id, name, app_config)?;
        success(&format!("Created application '{id}' ({name})"));
    }
    manager.set_current_application(id)?;
    manager.set_current_mode(id, Mode::Test.as_str())?;

    println!();
    success("Setup completed.");
    hint("Check it with `chargily status` or `chargily balance`.");
    Ok(())
}

// ── Reset ────────────────────────────────────────────────────────────

fn cmd_reset(manager: &mut ConfigManager, confirm: Option<&str>) -> Result<()> {
    if confirm != Some("RESET") {
        bail!("this deletes every application; pass --confirm RESET to proceed");
    }
    manager.reset_all_configuration()?;
    success("All configuration removed.");
    hint("Run `chargily setup` to configure the CLI again.");
    Ok(())
}
