use super::*;

impl SessionManager<TcpConnector> {
    /// Creates a disconnected session to `host` on the default telnet port.
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self::with_connector(host, credentials, SessionConfig::default(), TcpConnector)
    }

    /// Creates a disconnected session with explicit port, prompts and timeouts.
    pub fn with_config(
        host: impl Into<String>,
        credentials: Credentials,
        config: SessionConfig,
    ) -> Self {
        Self::with_connector(host, credentials, config, TcpConnector)
    }
}

impl<C: Connector> SessionManager<C> {
    /// Creates a disconnected session that opens streams through `connector`.
    pub fn with_connector(
        host: impl Into<String>,
        credentials: Credentials,
        config: SessionConfig,
        connector: C,
    ) -> Self {
        Self {
            host: host.into(),
            authenticator: Authenticator::new(credentials, &config),
            config,
            connector,
            transport: None,
            state: SessionState::Disconnected,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replaces the event observer (defaults to [`LogObserver`]).
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn credentials(&self) -> &Credentials {
        self.authenticator.credentials()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Opens the transport and logs in.
    ///
    /// A session that already holds a transport is disconnected first, so a
    /// session never owns two live streams. On failure the partially opened
    /// transport is closed, the session moves to [`SessionState::Failed`] and
    /// the cause is reported to the observer before it is returned.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            debug!("{} connect while holding a transport, disconnecting first", self.host);
            self.disconnect().await;
        }

        self.emit(SessionEvent::Connecting {
            host: self.host.clone(),
            port: self.config.port,
        });

        match self.establish().await {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                self.emit(SessionEvent::ConnectionEstablished {
                    host: self.host.clone(),
                });
                Ok(())
            }
            Err(err) => {
                self.release_transport().await;
                self.set_state(SessionState::Failed);
                self.emit(SessionEvent::ConnectionFailed {
                    host: self.host.clone(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Connects and reports only whether it worked.
    ///
    /// The cause of a failure still reaches the observer.
    pub async fn try_connect(&mut self) -> bool {
        self.connect().await.is_ok()
    }

    async fn establish(&mut self) -> Result<(), SessionError> {
        let transport = TelnetTransport::open(
            &self.connector,
            &self.host,
            self.config.port,
            self.config.connect_timeout(),
        )
        .await?;
        self.transport = Some(transport);
        self.set_state(SessionState::Authenticating);

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| SessionError::InternalServerError("transport vanished".to_string()))?;
        let transcript = self.authenticator.login(transport).await?;
        self.emit_raw(&transcript);
        Ok(())
    }

    /// Sends `command` and returns everything up to and including the next
    /// operational prompt, verbatim.
    ///
    /// Fails with [`SessionError::NotConnectedError`] unless the session is
    /// ready, without touching any transport. A transport failure or timeout
    /// is fatal to the stream: it is closed, the session moves to
    /// [`SessionState::Failed`] and the typed error is returned.
    pub async fn execute(&mut self, command: &str) -> Result<Output, SessionError> {
        if self.state != SessionState::Ready || self.transport.is_none() {
            return Err(SessionError::NotConnectedError);
        }
        if command.contains(['\r', '\n']) {
            return Err(SessionError::InvalidCommandError(format!(
                "line break in command {command:?}"
            )));
        }

        self.emit(SessionEvent::CommandSent {
            host: self.host.clone(),
            command: command.to_string(),
        });

        let result = match self.transport.as_mut() {
            Some(transport) => {
                round_trip(
                    transport,
                    command,
                    &self.config.command_prompt,
                    self.config.command_timeout(),
                )
                .await
            }
            None => Err(SessionError::NotConnectedError),
        };

        match result {
            Ok(raw) => {
                self.emit_raw(&raw);
                let all = String::from_utf8_lossy(&raw).into_owned();
                self.emit(SessionEvent::CommandOutput {
                    host: self.host.clone(),
                    command: command.to_string(),
                    all: all.clone(),
                });
                Ok(Output {
                    command: command.to_string(),
                    all,
                })
            }
            Err(err) => {
                self.emit(SessionEvent::CommandFailed {
                    host: self.host.clone(),
                    command: command.to_string(),
                    reason: err.to_string(),
                });
                self.release_transport().await;
                self.set_state(SessionState::Failed);
                Err(err)
            }
        }
    }

    /// Closes the transport if one is held and returns to
    /// [`SessionState::Disconnected`]. Never fails; safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if self.transport.is_some() {
            self.release_transport().await;
            self.emit(SessionEvent::ConnectionClosed {
                host: self.host.clone(),
                reason: "client_disconnect".to_string(),
            });
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.emit(SessionEvent::StateChanged {
            host: self.host.clone(),
            from,
            to,
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    fn emit_raw(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.emit(SessionEvent::RawChunk {
            host: self.host.clone(),
            data: String::from_utf8_lossy(data).into_owned(),
        });
    }
}

async fn round_trip<S>(
    transport: &mut TelnetTransport<S>,
    command: &str,
    prompt: &str,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, SessionError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let line = format!("{command}{}", config::LINE_ENDING);
    transport.write(line.as_bytes()).await?;
    transport.read_until(prompt.as_bytes(), timeout).await
}
