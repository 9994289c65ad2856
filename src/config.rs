//! Wire constants and per-session configuration.
//!
//! The constants describe the appliance's CLI contract: the administrative
//! port, the login prompts and the operational prompt. [`SessionConfig`]
//! bundles them with the timeouts that bound every blocking step.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Well-known telnet port used by the appliance's line interface.
pub const DEFAULT_PORT: u16 = 23;

/// Prompt emitted by the appliance before it accepts a username.
pub const USERNAME_PROMPT: &str = "Username:";

/// Prompt emitted by the appliance before it accepts a password.
pub const PASSWORD_PROMPT: &str = "Password:";

/// Operational prompt marker that terminates every command's output.
pub const COMMAND_PROMPT: &str = ">";

/// Line terminator appended to every credential and command.
pub const LINE_ENDING: &str = "\n";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Tunables for a single appliance session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// TCP port of the appliance's line interface.
    pub port: u16,

    /// Maximum time to establish the stream (milliseconds).
    pub connect_timeout_ms: u64,

    /// Maximum time to wait for each login prompt (milliseconds).
    pub login_timeout_ms: u64,

    /// Maximum time to wait for the command prompt after a command (milliseconds).
    pub command_timeout_ms: u64,

    pub username_prompt: String,
    pub password_prompt: String,

    /// Marker that ends a command's output. Huawei user view uses `>`.
    pub command_prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            username_prompt: USERNAME_PROMPT.to_string(),
            password_prompt: PASSWORD_PROMPT.to_string(),
            command_prompt: COMMAND_PROMPT.to_string(),
        }
    }
}

impl SessionConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json)
            .map_err(|e| SessionError::InternalServerError(format!("config decode error: {e}")))
    }

    /// Sets every timeout to the same bound. Mostly useful in tests.
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.connect_timeout_ms = ms;
        self.login_timeout_ms = ms;
        self.command_timeout_ms = ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
