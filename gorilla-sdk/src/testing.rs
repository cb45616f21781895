//! In-memory transports for exercising the core without a network.
//!
//! Enabled by the `testing` feature; add it on a dev-dependency.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, DuplexStream};
use tokio::time::Instant;

use crate::client::{BoxedStream, Connector};

#[derive(Default)]
struct Recording {
    writes: Vec<(Instant, String)>,
    fail: bool,
    shut_down: bool,
}

/// A writer that records every write with the (tokio) time it happened.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with `BrokenPipe`.
    pub fn fail_writes(&self) {
        self.inner.lock().fail = true;
    }

    pub fn writes(&self) -> Vec<(Instant, String)> {
        self.inner.lock().writes.clone()
    }

    /// Written data split into lines, terminators removed.
    pub fn lines(&self) -> Vec<String> {
        let joined: String = self.inner.lock().writes.iter().map(|(_, s)| s.as_str()).collect();
        joined
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut rec = self.inner.lock();
        if rec.fail {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        rec.writes
            .push((Instant::now(), String::from_utf8_lossy(buf).into_owned()));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.lock().shut_down = true;
        Poll::Ready(Ok(()))
    }
}

/// A connector that plays back a fixed script of outcomes.
///
/// Each `connect` call pops the next entry: `Some(stream)` succeeds with that
/// stream, `None` fails with `ConnectionRefused`. An exhausted script refuses.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Option<DuplexStream>>>>,
    attempts: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connect; returns the server side of the pipe.
    pub fn accept(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.script.lock().push_back(Some(client));
        server
    }

    /// Queue a refused connect.
    pub fn refuse(&self) {
        self.script.lock().push_back(None);
    }

    /// Every connect attempt so far, with its time and address.
    pub fn attempts(&self) -> Vec<(Instant, String)> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, addr: &str) -> io::Result<BoxedStream> {
        self.attempts.lock().push((Instant::now(), addr.to_string()));
        match self.script.lock().pop_front().flatten() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}
