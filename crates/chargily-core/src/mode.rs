//! Operating modes and the mode resolver.
//!
//! Precedence is fixed: a process-wide override beats the application's
//! stored mode, and `test` is the fallback when neither is available. The
//! override must keep winning so operators can force every application into
//! the sandbox at once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The environment an API call targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Sandboxed; no real money moves.
    #[default]
    Test,
    /// Real payments.
    Live,
}

impl Mode {
    /// Both modes, test first.
    pub const ALL: [Self; 2] = [Self::Test, Self::Live];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }

    #[must_use]
    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Self::Test),
            "live" => Ok(Self::Live),
            other => Err(ConfigError::InvalidMode {
                mode: other.to_owned(),
            }),
        }
    }
}

/// Resolve the effective mode.
///
/// `global_override` > `stored` > [`Mode::Test`].
#[must_use]
pub fn resolve_mode(global_override: Option<Mode>, stored: Option<Mode>) -> Mode {
    global_override.or(stored).unwrap_or(Mode::Test)
}
