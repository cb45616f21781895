//! Error taxonomy for the connection core.
//!
//! Transient I/O failures inside an established session (`Send`, `Receive`)
//! are recovered by the reconnect procedure. `Connect` on the initial dial and
//! `ReconnectExhausted` are terminal and surface from [`Connection::run`].
//!
//! [`Connection::run`]: crate::client::Connection::run

use std::io;

/// Errors produced by the connection core.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The initial TCP connect failed. Never retried.
    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Writing a line to the socket failed.
    #[error("message {line:?} failed to send: {source}")]
    Send {
        /// The line, or `<redacted>` when it was sent hidden.
        line: String,
        #[source]
        source: io::Error,
    },

    /// Reading from the socket failed or the peer closed the stream.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The reconnect cap was reached while reconnecting was still allowed.
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A received line could not be turned into tokens.
    #[error("malformed line: {reason}")]
    MalformedLine { reason: String },

    /// A send was attempted while no socket is attached.
    #[error("not connected")]
    NotConnected,
}

impl ClientError {
    /// Whether this error should hand control to the reconnect procedure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Send { .. } | ClientError::Receive(_) | ClientError::NotConnected
        )
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
