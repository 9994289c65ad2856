use super::*;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Login credentials for an appliance.
///
/// The password is kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// SHA-256 over username and password, used to compare cached sessions
    /// without keeping a second copy of the password around.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.password.as_bytes());
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Runs the two-round username/password handshake.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: Credentials,
    username_prompt: String,
    password_prompt: String,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(credentials: Credentials, config: &SessionConfig) -> Self {
        Self {
            credentials,
            username_prompt: config.username_prompt.clone(),
            password_prompt: config.password_prompt.clone(),
            timeout: config.login_timeout(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Waits for each login prompt and answers it.
    ///
    /// Returns every byte consumed from the stream during the handshake.
    /// Nothing is read after the password is sent; the operational prompt is
    /// left for the first command. On failure the caller must close the
    /// transport.
    pub async fn login<S>(&self, transport: &mut TelnetTransport<S>) -> Result<Vec<u8>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        single_line(AuthStage::Username, &self.credentials.username)?;
        single_line(AuthStage::Password, &self.credentials.password)?;

        let mut transcript = self
            .answer(
                transport,
                AuthStage::Username,
                &self.username_prompt,
                &self.credentials.username,
            )
            .await?;
        debug!("{} username sent", transport.host());

        transcript.extend(
            self.answer(
                transport,
                AuthStage::Password,
                &self.password_prompt,
                &self.credentials.password,
            )
            .await?,
        );
        debug!("{} password sent", transport.host());

        Ok(transcript)
    }

    async fn answer<S>(
        &self,
        transport: &mut TelnetTransport<S>,
        stage: AuthStage,
        prompt: &str,
        value: &str,
    ) -> Result<Vec<u8>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let seen = transport
            .read_until(prompt.as_bytes(), self.timeout)
            .await
            .map_err(|source| auth_failure(stage, source))?;
        let line = format!("{value}{}", config::LINE_ENDING);
        transport
            .write(line.as_bytes())
            .await
            .map_err(|source| auth_failure(stage, source))?;
        Ok(seen)
    }
}

/// Rejects a login value that would put extra lines on the CLI.
fn single_line(stage: AuthStage, value: &str) -> Result<(), SessionError> {
    if value.contains(['\r', '\n']) {
        return Err(auth_failure(
            stage,
            SessionError::InvalidCommandError(format!("line break in {stage}")),
        ));
    }
    Ok(())
}

fn auth_failure(stage: AuthStage, source: SessionError) -> SessionError {
    SessionError::AuthenticationError {
        stage,
        source: Box::new(source),
    }
}
