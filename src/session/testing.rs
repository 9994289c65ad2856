//! In-memory appliances for unit tests.

use super::*;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

/// Connector that hands out pre-queued in-memory pipes.
///
/// Each `push_appliance` call queues one client end and returns the
/// appliance end. Connecting with an empty queue is refused.
#[derive(Clone, Default)]
pub(crate) struct DuplexConnector {
    streams: Arc<Mutex<VecDeque<DuplexStream>>>,
    opened: Arc<AtomicUsize>,
}

impl DuplexConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_appliance(&self) -> DuplexStream {
        let (client, server) = duplex(4096);
        self.streams
            .lock()
            .expect("connector lock")
            .push_back(client);
        server
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().expect("connector lock").pop_front();
        next.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "no appliance queued"))
    }
}

/// Connector whose connect never completes.
#[derive(Clone, Copy, Default)]
pub(crate) struct PendingConnector;

impl Connector for PendingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
        std::future::pending().await
    }
}

/// Reads one `\n`-terminated line from the appliance side, without the newline.
pub(crate) async fn read_line(server: &mut DuplexStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let read = server.read(&mut byte).await.expect("appliance read");
        if read == 0 || byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8_lossy(&line).into_owned()
}

/// Plays the appliance side of the login handshake and returns the
/// (username, password) it received.
pub(crate) async fn serve_login(server: &mut DuplexStream) -> (String, String) {
    server.write_all(b"Username:").await.expect("send username prompt");
    let user = read_line(server).await;
    server.write_all(b"Password:").await.expect("send password prompt");
    let pass = read_line(server).await;
    (user, pass)
}
