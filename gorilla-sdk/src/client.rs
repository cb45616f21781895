//! Connection manager: socket lifecycle, receive loop and reconnects.
//!
//! A [`Connection`] dials the server, registers (`NICK`, `USER`, identity
//! probe), then runs the receive loop: a bounded wait on the socket, framing,
//! built-in `PING` replies, dispatch of every line, and a keepalive check per
//! iteration. A dropped link is retried after a fixed delay, up to a cap.
//!
//! ## States
//!
//! `Disconnected → Connecting → Running → (Closing | Reconnecting) →
//! Disconnected | Terminated`
//!
//! A failed *initial* connect is fatal. Only links that drop mid-session are
//! retried, and never after a permanent shutdown was requested.
//!
//! Everything runs on the caller's task. Handlers get `&mut Session`, so the
//! socket has a single writer and the send throttle holds for every line.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::credentials::CredentialProvider;
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::framer::{Framer, RECV_BUFFER};
use crate::keepalive::{IDLE_THRESHOLD, KeepaliveAction, PING_TIMEOUT};
use crate::line::Line;
use crate::sender::{MAX_LINE_LEN, MAX_SPLITS, SEND_INTERVAL};
use crate::session::Session;

/// Static configuration for one server link.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    /// Username (ident).
    pub ident: String,
    pub realname: String,
    /// Channels to join once registered, in order.
    pub channels: Vec<String>,
    pub admins: Vec<String>,
    /// Service that receives the `ACC` probe and `IDENTIFY`.
    pub identity_service: String,
    pub send_interval: Duration,
    /// Upper bound on one wait for socket data.
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
    pub idle_threshold: Duration,
    pub ping_timeout: Duration,
    pub max_line_len: usize,
    pub max_splits: usize,
    pub recv_buffer: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "irc.libera.chat".to_string(),
            port: 6667,
            nick: "GorillaBot".to_string(),
            ident: "GorillaBot".to_string(),
            realname: "GorillaBot".to_string(),
            channels: Vec::new(),
            admins: Vec::new(),
            identity_service: "NickServ".to_string(),
            send_interval: SEND_INTERVAL,
            poll_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            max_reconnects: 5,
            idle_threshold: IDLE_THRESHOLD,
            ping_timeout: PING_TIMEOUT,
            max_line_len: MAX_LINE_LEN,
            max_splits: MAX_SPLITS,
            recv_buffer: RECV_BUFFER,
        }
    }
}

impl ConnectConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Anything the connection can run the protocol over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the byte stream for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &str) -> io::Result<BoxedStream>;
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> io::Result<BoxedStream> {
        tracing::debug!("Resolving {addr}...");
        let tcp = TcpStream::connect(addr).await?;
        tracing::debug!("TCP connected to {addr}");
        Ok(Box::new(tcp))
    }
}

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Running,
    Closing,
    Reconnecting,
    Terminated,
}

enum SessionEnd {
    /// Interrupted and shut down for good.
    Interrupted,
    /// The link dropped or was closed; reconnect permission decides the rest.
    Ended,
}

/// One logical link to an IRC server.
pub struct Connection {
    session: Session,
    connector: Arc<dyn Connector>,
    state: LinkState,
    reconnect_tries: u32,
}

impl Connection {
    pub fn new(config: ConnectConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_connector(config, credentials, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        config: ConnectConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            session: Session::new(Arc::new(config), credentials),
            connector,
            state: LinkState::Disconnected,
            reconnect_tries: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Reconnect attempts since the last session that registered.
    pub fn reconnect_tries(&self) -> u32 {
        self.reconnect_tries
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "Link state change");
            self.state = state;
        }
    }

    /// Run until a permanent shutdown, an interrupt, or reconnect exhaustion.
    ///
    /// Every complete line goes to `dispatcher`. When `interrupt` resolves the
    /// connection quits gracefully and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] when the initial connect fails, and
    /// [`ClientError::ReconnectExhausted`] when the reconnect cap is reached.
    pub async fn run<D, F>(&mut self, dispatcher: &mut D, interrupt: F) -> Result<(), ClientError>
    where
        D: Dispatcher + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let addr = self.session.config().addr();
        self.set_state(LinkState::Connecting);
        let mut stream = match self.connector.connect(&addr).await {
            Ok(stream) => stream,
            Err(source) => {
                tracing::error!(
                    %addr,
                    error = %source,
                    "Unable to connect to IRC server. Check your Internet connection."
                );
                self.set_state(LinkState::Terminated);
                return Err(ClientError::Connect { addr, source });
            }
        };

        loop {
            tracing::info!(%addr, "Connected");
            match self.run_session(stream, dispatcher, &mut interrupt).await {
                SessionEnd::Interrupted => {
                    self.set_state(LinkState::Terminated);
                    return Ok(());
                }
                SessionEnd::Ended => {}
            }

            stream = match self.reconnect(&mut interrupt).await? {
                Some(stream) => stream,
                None => {
                    self.set_state(LinkState::Terminated);
                    return Ok(());
                }
            };
        }
    }

    /// Wait out the reconnect delay and dial again, up to the cap.
    ///
    /// `Ok(None)` means reconnecting is no longer permitted.
    async fn reconnect<F>(
        &mut self,
        interrupt: &mut Pin<&mut F>,
    ) -> Result<Option<BoxedStream>, ClientError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.session.config().addr();
        let max = self.session.config().max_reconnects;
        let delay = self.session.config().reconnect_delay;

        loop {
            if !self.session.reconnect_allowed() {
                return Ok(None);
            }
            if self.reconnect_tries >= max {
                tracing::error!(
                    attempts = self.reconnect_tries,
                    "Giving up on {addr} after {max} reconnect attempts"
                );
                self.set_state(LinkState::Terminated);
                return Err(ClientError::ReconnectExhausted {
                    attempts: self.reconnect_tries,
                });
            }

            self.set_state(LinkState::Reconnecting);
            tracing::debug!(
                "Attempting to reconnect ({} earlier tries).",
                self.reconnect_tries
            );
            tokio::select! {
                _ = interrupt.as_mut() => {
                    tracing::info!("Shut down by interrupt while reconnecting.");
                    self.session.close(false).await;
                    return Ok(None);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.reconnect_tries += 1;
            self.set_state(LinkState::Connecting);
            match self.connector.connect(&addr).await {
                Ok(stream) => return Ok(Some(stream)),
                Err(e) => {
                    tracing::warn!(
                        %addr,
                        attempt = self.reconnect_tries,
                        error = %e,
                        "Reconnect failed"
                    );
                }
            }
        }
    }

    /// Register on a fresh stream and run the receive loop until it ends.
    async fn run_session<D, F>(
        &mut self,
        stream: BoxedStream,
        dispatcher: &mut D,
        interrupt: &mut Pin<&mut F>,
    ) -> SessionEnd
    where
        D: Dispatcher + ?Sized,
        F: Future<Output = ()>,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.session.attach(Box::new(writer));

        if let Err(e) = self.register().await {
            tracing::error!(error = %e, "Registration failed");
            self.session.detach().await;
            return SessionEnd::Ended;
        }

        self.set_state(LinkState::Running);
        let end = self.receive_loop(reader, dispatcher, interrupt).await;
        self.session.detach().await;
        end
    }

    async fn register(&mut self) -> Result<(), ClientError> {
        let config = self.session.config();
        let nick = format!("NICK {}", config.nick);
        let user = format!("USER {} {} * :{}", config.ident, config.host, config.realname);
        let service = config.identity_service.clone();

        self.session.send(&nick, false).await?;
        self.session.send(&user, false).await?;
        self.session.private_message(&service, "ACC", false).await
    }

    async fn receive_loop<D, F>(
        &mut self,
        mut reader: ReadHalf<BoxedStream>,
        dispatcher: &mut D,
        interrupt: &mut Pin<&mut F>,
    ) -> SessionEnd
    where
        D: Dispatcher + ?Sized,
        F: Future<Output = ()>,
    {
        let mut framer = Framer::new();
        let poll_interval = self.session.config().poll_interval;
        let recv_buffer = self.session.config().recv_buffer;

        loop {
            framer.buffer_mut().reserve(recv_buffer);
            tokio::select! {
                _ = interrupt.as_mut() => {
                    tracing::info!("Shut down by interrupt.");
                    self.set_state(LinkState::Closing);
                    self.session.shut_down(false).await;
                    return SessionEnd::Interrupted;
                }
                read = tokio::time::timeout(
                    poll_interval,
                    reader.read_buf(framer.buffer_mut()),
                ) => {
                    match read {
                        Err(_elapsed) => {}
                        Ok(Ok(0)) => {
                            let err = ClientError::Receive(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed by server",
                            ));
                            tracing::error!(error = %err, "Socket error.");
                            self.session.detach().await;
                        }
                        Ok(Ok(_)) => {
                            for frame in framer.frames() {
                                self.handle_frame(&frame, dispatcher).await;
                                if !self.session.is_running() {
                                    break;
                                }
                            }
                        }
                        Ok(Err(source)) => {
                            let err = ClientError::Receive(source);
                            tracing::error!(error = %err, "Socket error.");
                            self.session.detach().await;
                        }
                    }
                }
            }

            if !self.session.is_running() {
                return SessionEnd::Ended;
            }

            match self.session.keepalive.check(Instant::now()) {
                KeepaliveAction::Idle => {}
                KeepaliveAction::SendPing => {
                    tracing::info!("Pinging server.");
                    let _ = self.session.ping().await;
                }
                KeepaliveAction::LinkDead => {
                    tracing::info!(
                        "No ping response in {} seconds.",
                        self.session.config().ping_timeout.as_secs()
                    );
                    self.set_state(LinkState::Closing);
                    self.session.shut_down(true).await;
                }
            }

            if !self.session.is_running() {
                return SessionEnd::Ended;
            }
        }
    }

    async fn handle_frame<D>(&mut self, frame: &[u8], dispatcher: &mut D)
    where
        D: Dispatcher + ?Sized,
    {
        let line = match Line::parse(frame) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping line");
                return;
            }
        };

        self.session.keepalive.record_received(Instant::now());

        match line.command() {
            Some("PING" | "PONG") => tracing::debug!("Received: {line}"),
            _ => tracing::info!("Received: {line}"),
        }

        match line.command() {
            Some("PING") => {
                let server = line
                    .params()
                    .first()
                    .map(|p| p.trim_start_matches(':').to_string())
                    .unwrap_or_else(|| self.session.host().to_string());
                let _ = self.session.pong(&server).await;
            }
            Some("001") => self.on_welcome().await,
            _ => {}
        }

        if let Err(e) = dispatcher.dispatch(&mut self.session, &line).await {
            tracing::error!(error = %e, %line, "Handler error");
        }
    }

    /// Registration finished: identify if we can, then (re)join channels.
    ///
    /// Only a welcome counts as an established session, so a server that
    /// accepts and then drops us still uses up reconnect attempts.
    async fn on_welcome(&mut self) {
        if self.reconnect_tries > 0 {
            tracing::info!(
                attempts = self.reconnect_tries,
                "Registered again, resetting reconnect counter"
            );
            self.reconnect_tries = 0;
        }
        if let Err(e) = self.session.identify().await {
            tracing::error!(error = %e, "Identify failed");
        }
        let channels: Vec<String> = self.session.channels().iter().map(str::to_string).collect();
        for channel in channels {
            if self.session.join(&channel).await.is_err() {
                break;
            }
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.session.config();
        let channels: Vec<&str> = self.session.channels().iter().collect();
        write!(
            f,
            "{} is joining {:?} on {} on port {}.",
            config.nick, channels, config.host, config.port
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.session.config();
        f.debug_struct("Connection")
            .field("host", &config.host)
            .field("port", &config.port)
            .field("nick", &config.nick)
            .field("ident", &config.ident)
            .field("realname", &config.realname)
            .field("state", &self.state)
            .field("reconnect_tries", &self.reconnect_tries)
            .finish()
    }
}
