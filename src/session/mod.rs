//! Telnet session management and command execution.
//!
//! This module drives an appliance's prompt-delimited CLI: it opens the
//! stream, answers the login prompts, then round-trips one command at a time
//! until the operational prompt comes back.
//!
//! # Main Components
//!
//! - [`SessionManager`] - One session: connect / execute / disconnect
//! - [`TelnetTransport`] - Byte stream with bounded read-until-pattern
//! - [`Authenticator`] - Username/password handshake
//! - [`SessionObserver`] - Injected sink for lifecycle events
//! - [`SessionHandle`] / [`SessionPool`] - Queued access to shared sessions

use log::{debug, trace};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{self, SessionConfig};
use crate::error::{AuthStage, SessionError};

pub use auth::{Authenticator, Credentials};
pub use observer::{
    FanoutObserver, LogObserver, SessionEvent, SessionObserver, SessionRecordEntry,
    SessionRecordLevel, SessionRecorder,
};
pub use pool::{SessionHandle, SessionPool};
pub use transport::{Connector, TcpConnector, TelnetTransport};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transport held. Initial state and the result of `disconnect()`.
    #[default]
    Disconnected,
    /// Transport open, login handshake in progress.
    Authenticating,
    /// Logged in; commands are accepted.
    Ready,
    /// The last connect or command failed and the transport was released.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The output of a command execution.
///
/// `all` is everything the appliance sent back, verbatim: the echoed
/// command, the output body and the trailing prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Output {
    pub command: String,
    pub all: String,
}

impl Output {
    pub fn as_str(&self) -> &str {
        &self.all
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.all)
    }
}

/// A session with one appliance.
///
/// Owns the transport exclusively: it is created by [`connect`](Self::connect)
/// and released by [`disconnect`](Self::disconnect), by any failed operation,
/// or on drop. All operations take `&mut self`, so requests on one session
/// never interleave.
pub struct SessionManager<C: Connector = TcpConnector> {
    host: String,
    config: SessionConfig,
    authenticator: Authenticator,
    connector: C,
    transport: Option<TelnetTransport<C::Stream>>,
    state: SessionState,
    observer: Arc<dyn SessionObserver>,
}

mod auth;
mod client;
mod observer;
mod pool;
mod transport;

#[cfg(test)]
pub(crate) mod testing;
