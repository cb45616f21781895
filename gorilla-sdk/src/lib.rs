//! gorilla-sdk: the connection core of an IRC bot.
//!
//! Inbound, bytes flow socket → [`framer`] → [`dispatch`]; outbound,
//! handlers → [`session::Session`] → [`sender`] → socket. The
//! [`keepalive`] monitor watches the inbound side and pings through the
//! outbound one. [`client::Connection`] owns the socket and ties it together.

pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod keepalive;
pub mod line;
pub mod sender;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ConnectConfig, Connection, LinkState};
pub use dispatch::{Command, CommandKind, CommandRouter, Dispatcher, Handler};
pub use error::ClientError;
pub use line::Line;
pub use session::Session;
