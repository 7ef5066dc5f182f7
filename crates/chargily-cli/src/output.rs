//! Terminal output helpers.

use chargily_core::Mode;
use serde_json::Value;

// ── ANSI color helpers ───────────────────────────────────────────────

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const WHITE: &str = "\x1b[37m";

// ── Pretty output helpers ────────────────────────────────────────────

/// Width of the key column in `kv_line` output.
const KEY_WIDTH: usize = 18;

/// Section title with an underline as wide as the title itself.
pub fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}{}{RESET}", underline(title));
}

fn underline(title: &str) -> String {
    // Icon, space, then the title.
    "═".repeat(title.chars().count() + 2)
}

pub fn kv_line(key: &str, value: &str) {
    println!("{}", kv_text(key, value));
}

fn kv_text(key: &str, value: &str) -> String {
    format!("  {DIM}{key:>KEY_WIDTH$}{RESET}  {WHITE}{value}{RESET}")
}

pub fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

pub fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}!{RESET} {YELLOW}{msg}{RESET}");
}

pub fn failure(msg: &str) {
    println!("{RED}{BOLD}✗{RESET} {msg}");
}

pub fn hint(msg: &str) {
    println!("  {DIM}→ {msg}{RESET}");
}

/// `TEST` in green or `LIVE` in red.
pub fn mode_badge(mode: Mode) -> String {
    match mode {
        Mode::Test => format!("{GREEN}{BOLD}TEST{RESET}"),
        Mode::Live => format!("{RED}{BOLD}LIVE{RESET}"),
    }
}

pub fn yes_no(value: bool) -> String {
    if value {
        format!("{GREEN}yes{RESET}")
    } else {
        format!("{DIM}no{RESET}")
    }
}

pub fn or_none(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("(not set)")
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

/// Wallet lines from a balance payload, or the raw JSON if it has no wallets.
pub fn print_balance(payload: &Value) {
    let Some(wallets) = payload.get("wallets").and_then(Value::as_array) else {
        print_json(payload);
        return;
    };
    for wallet in wallets {
        let currency = wallet
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_uppercase();
        let amount = |field: &str| wallet.get(field).map_or_else(|| "0".to_owned(), ToString::to_string);
        kv_line(&currency, &amount("balance"));
        if wallet.get("ready_for_payout").is_some() || wallet.get("on_hold").is_some() {
            kv_line(
                "",
                &format!(
                    "{DIM}ready for payout {}, on hold {}",
                    amount("ready_for_payout"),
                    amount("on_hold")
                ),
            );
        }
    }
}
