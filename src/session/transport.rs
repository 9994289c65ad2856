use super::*;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const READ_CHUNK: usize = 4096;

/// Opens raw byte streams to an appliance.
///
/// Production code uses [`TcpConnector`]; tests plug in in-memory pipes.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP connector for the appliance's line interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Telnet option negotiation parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FilterState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Strips telnet commands from the inbound stream and refuses every option.
///
/// Keeps its state between chunks so sequences split across reads are handled.
#[derive(Debug, Default)]
struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    /// Appends the data bytes of `input` to `out` and returns the negotiation
    /// replies that must be sent back to the peer.
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Vec<u8> {
        let mut replies = Vec::new();
        for &byte in input {
            self.state = match (self.state, byte) {
                (FilterState::Data, IAC) => FilterState::Iac,
                (FilterState::Data, b) => {
                    out.push(b);
                    FilterState::Data
                }
                (FilterState::Iac, IAC) => {
                    out.push(IAC);
                    FilterState::Data
                }
                (FilterState::Iac, verb @ (WILL | WONT | DO | DONT)) => FilterState::Negotiate(verb),
                (FilterState::Iac, SB) => FilterState::Sub,
                (FilterState::Iac, _) => FilterState::Data,
                (FilterState::Negotiate(verb), option) => {
                    match verb {
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        _ => {}
                    }
                    FilterState::Data
                }
                (FilterState::Sub, IAC) => FilterState::SubIac,
                (FilterState::Sub, _) => FilterState::Sub,
                (FilterState::SubIac, SE) => FilterState::Data,
                (FilterState::SubIac, _) => FilterState::Sub,
            };
        }
        replies
    }
}

fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            escaped.push(IAC);
        }
        escaped.push(byte);
    }
    escaped
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn closed_error() -> SessionError {
    SessionError::IoError(io::Error::new(
        io::ErrorKind::NotConnected,
        "transport already closed",
    ))
}

/// A telnet-style byte stream to one appliance.
pub struct TelnetTransport<S> {
    host: String,
    stream: Option<S>,
    /// Filtered inbound data not yet returned by `read_until`.
    buffer: Vec<u8>,
    filter: TelnetFilter,
}

impl<S> TelnetTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already established stream.
    pub fn new(host: impl Into<String>, stream: S) -> Self {
        Self {
            host: host.into(),
            stream: Some(stream),
            buffer: Vec::new(),
            filter: TelnetFilter::default(),
        }
    }

    /// Establishes a stream to `host:port`, bounded by `timeout`.
    pub async fn open<C>(
        connector: &C,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, SessionError>
    where
        C: Connector<Stream = S>,
    {
        match tokio::time::timeout(timeout, connector.connect(host, port)).await {
            Ok(Ok(stream)) => {
                debug!("{}:{} TCP connection successful", host, port);
                Ok(Self::new(host, stream))
            }
            Ok(Err(source)) => Err(SessionError::ConnectError {
                host: format!("{host}:{port}"),
                source,
            }),
            Err(_) => Err(SessionError::ConnectTimeout {
                host: format!("{host}:{port}"),
                timeout,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends raw bytes, escaping any IAC byte.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or_else(closed_error)?;
        stream.write_all(&escape_iac(data)).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads until `pattern` appears and returns everything up to and
    /// including it. Bytes after the match stay buffered for the next call.
    ///
    /// `timeout` bounds the whole call. Telnet negotiation received while
    /// waiting is answered and never shows up in the returned data.
    pub async fn read_until(
        &mut self,
        pattern: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if pattern.is_empty() {
                return Ok(Vec::new());
            }
            if let Some(pos) = find_subsequence(&self.buffer, pattern) {
                let end = pos + pattern.len();
                return Ok(self.buffer.drain(..end).collect());
            }

            let stream = self.stream.as_mut().ok_or_else(closed_error)?;
            let read = match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => return Err(timed_out(pattern, &self.buffer)),
            };

            if read == 0 {
                debug!("{} peer closed the stream", self.host);
                return Err(SessionError::ChannelDisconnectError {
                    partial: String::from_utf8_lossy(&self.buffer).into_owned(),
                });
            }
            trace!("{} <- {:?}", self.host, String::from_utf8_lossy(&chunk[..read]));

            let replies = self.filter.feed(&chunk[..read], &mut self.buffer);
            if !replies.is_empty() {
                trace!("{} refusing telnet options {:?}", self.host, replies);
                let answered = tokio::time::timeout_at(deadline, async {
                    stream.write_all(&replies).await?;
                    stream.flush().await
                })
                .await;
                match answered {
                    Ok(result) => result?,
                    Err(_) => return Err(timed_out(pattern, &self.buffer)),
                }
            }
        }
    }

    /// Shuts the stream down and releases it. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                debug!("{} error shutting down stream: {}", self.host, err);
            }
            debug!("{} transport closed", self.host);
        }
        self.buffer.clear();
        self.filter = TelnetFilter::default();
    }
}

fn timed_out(pattern: &[u8], partial: &[u8]) -> SessionError {
    SessionError::TimeoutError {
        pattern: String::from_utf8_lossy(pattern).into_owned(),
        partial: String::from_utf8_lossy(partial).into_owned(),
    }
}
