use super::*;
use moka::future::Cache;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A job queued for a session worker.
enum CmdJob {
    Execute {
        command: String,
        responder: oneshot::Sender<Result<Output, SessionError>>,
    },
    Disconnect {
        responder: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a session owned by a background worker.
///
/// The worker runs queued commands strictly one after another, so any number
/// of callers can share one appliance connection. When the last handle is
/// dropped, or a command leaves the session failed, the worker disconnects
/// the session and stops.
#[derive(Clone)]
pub struct SessionHandle {
    host: String,
    sender: mpsc::Sender<CmdJob>,
}

impl SessionHandle {
    /// Moves `manager` into a worker task. Must be called within a tokio runtime.
    pub fn spawn<C>(mut manager: SessionManager<C>) -> Self
    where
        C: Connector + 'static,
    {
        let host = manager.host().to_string();
        let (tx, mut rx) = mpsc::channel::<CmdJob>(32);

        let worker_host = host.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    CmdJob::Execute { command, responder } => {
                        let res = manager.execute(&command).await;
                        if !manager.is_ready() {
                            // The session failed; stop taking jobs so pools replace it.
                            rx.close();
                            let _ = responder.send(res);
                            break;
                        }
                        let _ = responder.send(res);
                    }
                    CmdJob::Disconnect { responder } => {
                        rx.close();
                        manager.disconnect().await;
                        let _ = responder.send(());
                        break;
                    }
                }
            }
            manager.disconnect().await;
            debug!("{} session worker stopped", worker_host);
        });

        Self { host, sender: tx }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Queues `command` and waits for its output.
    pub async fn execute(&self, command: impl Into<String>) -> Result<Output, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(CmdJob::Execute {
                command: command.into(),
                responder,
            })
            .await
            .map_err(|_| SessionError::WorkerClosedError)?;
        rx.await.map_err(|_| SessionError::WorkerClosedError)?
    }

    /// Disconnects the session after already queued jobs and stops the worker.
    /// Jobs queued behind the disconnect fail with
    /// [`SessionError::WorkerClosedError`]. No-op if the worker has already
    /// stopped.
    pub async fn disconnect(&self) {
        let (responder, rx) = oneshot::channel();
        if self
            .sender
            .send(CmdJob::Disconnect { responder })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Returns true once the worker has stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Clone)]
struct PooledSession {
    handle: SessionHandle,
    fingerprint: [u8; 32],
}

/// Cache of connected sessions, one per `user@host:port`.
///
/// Entries are evicted after five minutes without use; the worker shuts its
/// session down once every handle to it is gone.
#[derive(Clone)]
pub struct SessionPool<C: Connector + Clone + 'static = TcpConnector> {
    cache: Cache<String, PooledSession>,
    connector: C,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
}

impl SessionPool<TcpConnector> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector + Clone + 'static> SessionPool<C> {
    pub fn with_connector(config: SessionConfig, connector: C) -> Self {
        // Cache up to 100 sessions. Evict after 5 minutes of inactivity.
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();

        Self {
            cache,
            connector,
            config,
            observer: Arc::new(LogObserver),
        }
    }

    /// Observer handed to every session this pool creates.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn key(&self, host: &str, username: &str) -> String {
        format!("{username}@{host}:{}", self.config.port)
    }

    /// Returns a cached session handle or connects a new one.
    ///
    /// A cached session is reused only if its worker is still running and it
    /// was opened with the same credentials; otherwise it is shut down and
    /// replaced.
    pub async fn get(
        &self,
        host: &str,
        credentials: Credentials,
    ) -> Result<SessionHandle, SessionError> {
        let key = self.key(host, credentials.username());

        if let Some(entry) = self.cache.get(&key).await {
            debug!("Cache hit: {}", key);
            if entry.handle.is_closed() {
                debug!("Cached session {} is closed. Removing.", key);
                self.cache.invalidate(&key).await;
            } else if entry.fingerprint == credentials.fingerprint() {
                return Ok(entry.handle);
            } else {
                debug!("Cached session credentials mismatch, recreating: {}", key);
                entry.handle.disconnect().await;
                self.cache.invalidate(&key).await;
            }
        } else {
            debug!("Cache miss, creating new session for {}...", key);
        }

        let fingerprint = credentials.fingerprint();
        let mut manager = SessionManager::with_connector(
            host,
            credentials,
            self.config.clone(),
            self.connector.clone(),
        )
        .with_observer(self.observer.clone());
        manager.connect().await?;

        let handle = SessionHandle::spawn(manager);
        self.cache
            .insert(
                key.clone(),
                PooledSession {
                    handle: handle.clone(),
                    fingerprint,
                },
            )
            .await;
        debug!("New session for {} has been cached.", key);

        Ok(handle)
    }

    /// Drops the cached session for `username@host`, disconnecting it.
    pub async fn invalidate(&self, host: &str, username: &str) {
        let key = self.key(host, username);
        if let Some(entry) = self.cache.remove(&key).await {
            entry.handle.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{DuplexConnector, read_line, serve_login};
    use tokio::io::AsyncWriteExt;

    fn config() -> SessionConfig {
        SessionConfig::default().with_timeouts(Duration::from_millis(500))
    }

    /// Appliance that echoes every command followed by a prompt.
    fn spawn_echo_appliance(connector: &DuplexConnector) -> tokio::task::JoinHandle<Vec<String>> {
        let mut server = connector.push_appliance();
        tokio::spawn(async move {
            serve_login(&mut server).await;
            let mut seen = Vec::new();
            loop {
                let line = read_line(&mut server).await;
                if line.is_empty() {
                    break;
                }
                let reply = format!("{line}\nok\nOLT>");
                if server.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
                seen.push(line);
            }
            seen
        })
    }

    async fn connected(connector: &DuplexConnector) -> SessionManager<DuplexConnector> {
        let mut manager = SessionManager::with_connector(
            "10.0.0.5",
            Credentials::new("admin", "secret"),
            config(),
            connector.clone(),
        );
        manager.connect().await.expect("connect");
        manager
    }

    #[tokio::test]
    async fn worker_serializes_queued_commands() {
        let connector = DuplexConnector::new();
        let appliance = spawn_echo_appliance(&connector);
        let handle = SessionHandle::spawn(connected(&connector).await);

        let a = handle.clone();
        let b = handle.clone();
        let (first, second) = tokio::join!(
            a.execute("display version"),
            b.execute("display board 0")
        );
        let first = first.expect("first command");
        let second = second.expect("second command");
        assert_eq!(first.all, "display version\nok\nOLT>");
        assert_eq!(second.all, "display board 0\nok\nOLT>");

        handle.disconnect().await;
        assert!(handle.is_closed());
        let seen = appliance.await.unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn execute_after_disconnect_reports_closed_worker() {
        let connector = DuplexConnector::new();
        let _appliance = spawn_echo_appliance(&connector);
        let handle = SessionHandle::spawn(connected(&connector).await);

        handle.disconnect().await;
        handle.disconnect().await;
        let err = handle.execute("display version").await.unwrap_err();
        assert!(matches!(err, SessionError::WorkerClosedError));
    }

    #[tokio::test]
    async fn pool_reuses_session_for_same_credentials() {
        let connector = DuplexConnector::new();
        let _appliance = spawn_echo_appliance(&connector);
        let pool = SessionPool::with_connector(config(), connector.clone());

        let first = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("first get");
        let second = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("second get");

        assert_eq!(connector.opened(), 1);
        assert_eq!(
            second.execute("display time").await.expect("execute").all,
            "display time\nok\nOLT>"
        );
        drop(first);
    }

    #[tokio::test]
    async fn pool_replaces_session_when_password_changes() {
        let connector = DuplexConnector::new();
        let _first_appliance = spawn_echo_appliance(&connector);
        let _second_appliance = spawn_echo_appliance(&connector);
        let pool = SessionPool::with_connector(config(), connector.clone());

        let old = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("first get");
        let new = pool
            .get("10.0.0.5", Credentials::new("admin", "rotated"))
            .await
            .expect("second get");

        assert_eq!(connector.opened(), 2);
        assert!(old.is_closed());
        assert!(!new.is_closed());
    }

    #[tokio::test]
    async fn pool_replaces_session_that_failed_a_command() {
        let connector = DuplexConnector::new();
        let mut silent = connector.push_appliance();
        let silent_appliance = tokio::spawn(async move {
            serve_login(&mut silent).await;
            let command = read_line(&mut silent).await;
            // Hold the stream until the client hangs up.
            read_line(&mut silent).await;
            command
        });
        let _echo_appliance = spawn_echo_appliance(&connector);
        let pool = SessionPool::with_connector(config(), connector.clone());

        let stale = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("first get");
        let err = stale.execute("display version").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(stale.is_closed());
        assert!(matches!(
            stale.execute("display time").await,
            Err(SessionError::WorkerClosedError)
        ));

        let fresh = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("second get");
        assert_eq!(connector.opened(), 2);
        assert_eq!(
            fresh.execute("display time").await.expect("execute").all,
            "display time\nok\nOLT>"
        );
        assert_eq!(silent_appliance.await.unwrap(), "display version");
    }

    #[tokio::test]
    async fn rejected_command_keeps_worker_running() {
        let connector = DuplexConnector::new();
        let _appliance = spawn_echo_appliance(&connector);
        let handle = SessionHandle::spawn(connected(&connector).await);

        let err = handle.execute("display version\nquit").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCommandError(_)));
        assert!(!handle.is_closed());
        assert_eq!(
            handle.execute("display time").await.expect("execute").all,
            "display time\nok\nOLT>"
        );
        handle.disconnect().await;
    }

    #[tokio::test]
    async fn pool_surfaces_connect_failure() {
        let pool = SessionPool::with_connector(config(), DuplexConnector::new());
        let err = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .err()
            .expect("no appliance");
        assert!(matches!(err, SessionError::ConnectError { .. }));
    }

    #[tokio::test]
    async fn invalidate_disconnects_cached_session() {
        let connector = DuplexConnector::new();
        let _appliance = spawn_echo_appliance(&connector);
        let pool = SessionPool::with_connector(config(), connector);

        let handle = pool
            .get("10.0.0.5", Credentials::new("admin", "secret"))
            .await
            .expect("get");
        pool.invalidate("10.0.0.5", "admin").await;
        assert!(handle.is_closed());
    }
}
