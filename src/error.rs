//! Error types for telnet sessions, the login handshake and command execution.
//!
//! Every failure a session can run into is a variant of [`SessionError`], so
//! callers can tell a refused connection from a bad login or a stalled prompt
//! instead of receiving a plain pass/fail.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Login handshake step that was in progress when authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Waiting for the username prompt or sending the username.
    Username,
    /// Waiting for the password prompt or sending the password.
    Password,
}

impl std::fmt::Display for AuthStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStage::Username => f.write_str("username"),
            AuthStage::Password => f.write_str("password"),
        }
    }
}

/// Errors that can occur while connecting to and driving an appliance CLI.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The stream to the appliance could not be established.
    ///
    /// Covers unreachable hosts, refused connections and name resolution
    /// failures.
    #[error("connect to {host} failed: {source}")]
    ConnectError {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Establishing the stream did not finish within the connect timeout.
    #[error("connect to {host} timed out after {timeout:?}")]
    ConnectTimeout { host: String, timeout: Duration },

    /// The login handshake failed.
    ///
    /// Wraps the transport failure that aborted the handshake.
    #[error("authentication failed at {stage} prompt: {source}")]
    AuthenticationError {
        stage: AuthStage,
        #[source]
        source: Box<SessionError>,
    },

    /// A command was issued while the session was not ready.
    #[error("not connected")]
    NotConnectedError,

    /// The expected prompt was not seen before the read deadline.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("timed out waiting for {pattern:?}, received: {partial:?}")]
    TimeoutError { pattern: String, partial: String },

    /// The appliance closed the stream before the expected prompt arrived.
    #[error("channel disconnect while waiting for prompt, received: {partial:?}")]
    ChannelDisconnectError { partial: String },

    /// The stream failed mid-operation or was already closed.
    #[error("transport io error: {0}")]
    IoError(#[from] io::Error),

    /// The command text cannot be sent as a single CLI line.
    #[error("invalid command: {0}")]
    InvalidCommandError(String),

    /// The device inventory file is malformed.
    #[error("invalid device inventory: {0}")]
    InventoryFormatError(String),

    /// The session worker has stopped and no longer accepts jobs.
    #[error("session worker closed")]
    WorkerClosedError,

    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl SessionError {
    /// Returns true if the failure was caused by an elapsed deadline.
    ///
    /// Looks through authentication failures to the underlying cause.
    pub fn is_timeout(&self) -> bool {
        match self {
            SessionError::ConnectTimeout { .. } | SessionError::TimeoutError { .. } => true,
            SessionError::AuthenticationError { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
