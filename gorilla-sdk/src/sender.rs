//! Outbound side: throttled line writes and message splitting.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::ClientError;

/// Minimum spacing between two physical sends.
pub const SEND_INTERVAL: Duration = Duration::from_secs(1);
/// Practical payload limit for one PRIVMSG, in characters.
pub const MAX_LINE_LEN: usize = 400;
/// Split iterations allowed per message.
pub const MAX_SPLITS: usize = 5;

/// Write half of whatever transport the connection runs on.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serializes outbound lines onto the socket, one at a time, never faster
/// than the configured interval.
pub struct Sender {
    writer: Option<BoxedWriter>,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl Sender {
    pub fn new(interval: Duration) -> Self {
        Self {
            writer: None,
            interval,
            last_sent: None,
        }
    }

    pub fn attach(&mut self, writer: BoxedWriter) {
        self.writer = Some(writer);
    }

    /// Drop the writer, returning it so the caller can shut it down.
    pub fn detach(&mut self) -> Option<BoxedWriter> {
        self.writer.take()
    }

    pub fn is_attached(&self) -> bool {
        self.writer.is_some()
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// Write one line followed by CRLF.
    ///
    /// Waits until `interval` has passed since the previous send. With `hide`
    /// set the content is kept out of the logs.
    pub async fn send(&mut self, line: &str, hide: bool) -> Result<(), ClientError> {
        if let Some(last) = self.last_sent {
            let ready_at = last + self.interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let shown = if hide { "<redacted>" } else { line };
        let Some(writer) = self.writer.as_mut() else {
            tracing::error!(line = shown, "Message failed to send: not connected");
            return Err(ClientError::NotConnected);
        };

        // Embedded terminators would smuggle extra commands onto the wire.
        let mut wire = line.replace(['\r', '\n'], " ");
        wire.push_str("\r\n");

        self.last_sent = Some(Instant::now());
        let result = match writer.write_all(wire.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if hide {
                    tracing::debug!("Sent message: {shown}");
                } else {
                    tracing::info!("Sent message: {line}");
                }
                Ok(())
            }
            Err(source) => {
                tracing::error!(error = %source, "Message {shown} failed to send");
                Err(ClientError::Send {
                    line: shown.to_string(),
                    source,
                })
            }
        }
    }
}

/// Split `text` into chunks of at most `max_len` characters.
///
/// Words (split on single spaces) are packed greedily. A word longer than
/// `max_len` is cut at `max_len` and its remainder is handled by the next
/// iteration. At most `max_splits` iterations run; anything left after the
/// last one is not sent.
pub fn split_message(text: &str, max_len: usize, max_splits: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut words: std::collections::VecDeque<String> =
        text.split(' ').map(str::to_string).collect();
    let mut chunks = Vec::new();
    let mut splits = 0;

    while !words.is_empty() && splits < max_splits {
        splits += 1;
        let first_len = words[0].chars().count();
        if first_len > max_len {
            let Some(word) = words.pop_front() else { break };
            let cut = word
                .char_indices()
                .nth(max_len)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            chunks.push(word[..cut].to_string());
            words.push_front(word[cut..].to_string());
        } else {
            let mut chunk = String::new();
            let mut chunk_len = 0;
            let mut taken = 0;
            while let Some(word) = words.front() {
                let word_len = word.chars().count();
                let joined_len = if taken == 0 { word_len } else { chunk_len + 1 + word_len };
                if joined_len > max_len {
                    break;
                }
                if taken > 0 {
                    chunk.push(' ');
                }
                chunk.push_str(word);
                chunk_len = joined_len;
                taken += 1;
                words.pop_front();
            }
            chunks.push(chunk);
        }
    }

    if !words.is_empty() {
        tracing::warn!(
            dropped_words = words.len(),
            "Message exceeded {max_splits} splits, remainder not sent"
        );
    }
    chunks
}
