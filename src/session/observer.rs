use super::*;
use log::{error, info, warn};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Receives every lifecycle event a session emits.
///
/// Injected into [`SessionManager`] so the core has no hidden dependency on a
/// process-wide logger and tests can capture exactly what happened.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Supported session event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Connecting {
        host: String,
        port: u16,
    },
    ConnectionEstablished {
        host: String,
    },
    ConnectionFailed {
        host: String,
        reason: String,
    },
    StateChanged {
        host: String,
        from: SessionState,
        to: SessionState,
    },
    CommandSent {
        host: String,
        command: String,
    },
    CommandOutput {
        host: String,
        command: String,
        all: String,
    },
    CommandFailed {
        host: String,
        command: String,
        reason: String,
    },
    ConnectionClosed {
        host: String,
        reason: String,
    },
    RawChunk {
        host: String,
        data: String,
    },
}

impl SessionEvent {
    pub fn host(&self) -> &str {
        match self {
            SessionEvent::Connecting { host, .. }
            | SessionEvent::ConnectionEstablished { host }
            | SessionEvent::ConnectionFailed { host, .. }
            | SessionEvent::StateChanged { host, .. }
            | SessionEvent::CommandSent { host, .. }
            | SessionEvent::CommandOutput { host, .. }
            | SessionEvent::CommandFailed { host, .. }
            | SessionEvent::ConnectionClosed { host, .. }
            | SessionEvent::RawChunk { host, .. } => host,
        }
    }
}

/// Default observer: forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connecting { host, port } => debug!("{host}:{port} connecting"),
            SessionEvent::ConnectionEstablished { host } => info!("Connected to OLT at {host}"),
            SessionEvent::ConnectionFailed { host, reason } => {
                error!("Failed to connect to OLT at {host}: {reason}")
            }
            SessionEvent::StateChanged { host, from, to } => debug!("{host} state {from} -> {to}"),
            SessionEvent::CommandSent { host, command } => debug!("{host} -> {command:?}"),
            SessionEvent::CommandOutput { host, command, all } => {
                debug!("{host} command {command:?} returned {} bytes", all.len())
            }
            SessionEvent::CommandFailed {
                host,
                command,
                reason,
            } => warn!("Error sending command {command:?} to {host}: {reason}"),
            SessionEvent::ConnectionClosed { host, reason } => {
                info!("Disconnected from OLT at {host} ({reason})")
            }
            SessionEvent::RawChunk { host, data } => trace!("{host} <- {data:?}"),
        }
    }
}

/// Forwards each event to several observers in order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn SessionObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }
}

impl SessionObserver for FanoutObserver {
    fn on_event(&self, event: &SessionEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Session recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionRecordLevel {
    /// Disable recording.
    Off,
    /// Record key events only.
    KeyEventsOnly,
    /// Record key events and raw wire data.
    #[default]
    Full,
}

/// A single recorded session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    pub ts_ms: u128,
    pub event: SessionEvent,
}

/// In-memory session recorder.
///
/// Cloning shares the same underlying record, so one clone can be handed to a
/// session while another is inspected.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    entries: Arc<Mutex<Vec<SessionRecordEntry>>>,
}

impl SessionRecorder {
    /// Create a recorder with the given level.
    pub fn new(level: SessionRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    /// Record an event, subject to the recording level.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), SessionError> {
        match (self.level, &event) {
            (SessionRecordLevel::Off, _) => return Ok(()),
            (SessionRecordLevel::KeyEventsOnly, SessionEvent::RawChunk { .. }) => return Ok(()),
            _ => {}
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| SessionError::InternalServerError(format!("record lock error: {e}")))?;
        guard.push(SessionRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, SessionError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| SessionError::InternalServerError(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    /// Snapshot recorded events without timestamps.
    pub fn events(&self) -> Result<Vec<SessionEvent>, SessionError> {
        Ok(self.entries()?.into_iter().map(|entry| entry.event).collect())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| SessionError::InternalServerError(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, SessionError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                SessionError::InternalServerError(format!("record encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL lines. Blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, SessionError> {
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: SessionRecordEntry = serde_json::from_str(line).map_err(|e| {
                SessionError::InternalServerError(format!("record decode error: {e}"))
            })?;
            parsed.push(entry);
        }

        Ok(Self {
            level: SessionRecordLevel::Full,
            entries: Arc::new(Mutex::new(parsed)),
        })
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new(SessionRecordLevel::Full)
    }
}

impl SessionObserver for SessionRecorder {
    fn on_event(&self, event: &SessionEvent) {
        if let Err(err) = self.record_event(event.clone()) {
            debug!("dropping session event: {err}");
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
