//! The live session handed to handlers.
//!
//! A [`Session`] outlives individual sockets: the channel set, admin list and
//! reconnect permission survive a reconnect, only the writer is swapped.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::client::ConnectConfig;
use crate::credentials::CredentialProvider;
use crate::error::ClientError;
use crate::keepalive::KeepaliveMonitor;
use crate::sender::{BoxedWriter, Sender, split_message};
use crate::state::{AdminError, AdminList, ChannelSet};

pub struct Session {
    config: Arc<ConnectConfig>,
    credentials: Arc<dyn CredentialProvider>,
    sender: Sender,
    pub(crate) keepalive: KeepaliveMonitor,
    channels: ChannelSet,
    admins: AdminList,
    running: bool,
    try_reconnect: bool,
}

impl Session {
    pub(crate) fn new(
        config: Arc<ConnectConfig>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let keepalive =
            KeepaliveMonitor::new(config.idle_threshold, config.ping_timeout, Instant::now());
        Self {
            sender: Sender::new(config.send_interval),
            channels: ChannelSet::new(config.channels.iter().cloned()),
            admins: AdminList::new(config.admins.iter().cloned()),
            keepalive,
            credentials,
            config,
            running: false,
            try_reconnect: true,
        }
    }

    pub(crate) fn attach(&mut self, writer: BoxedWriter) {
        self.sender.attach(writer);
        self.keepalive.reset(Instant::now());
        self.running = true;
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn nick(&self) -> &str {
        &self.config.nick
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a dropped link will be retried.
    pub fn reconnect_allowed(&self) -> bool {
        self.try_reconnect
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn admins(&self) -> &AdminList {
        &self.admins
    }

    pub fn is_admin(&self, nick: &str) -> bool {
        self.admins.is_admin(nick)
    }

    pub fn add_admin(&mut self, nick: &str) -> Result<(), AdminError> {
        self.admins.add(nick.to_string())?;
        tracing::info!(nick, "Added bot admin");
        Ok(())
    }

    /// Refuses to remove the last remaining admin.
    pub fn remove_admin(&mut self, nick: &str) -> Result<(), AdminError> {
        self.admins.remove(nick)?;
        tracing::info!(nick, "Removed bot admin");
        Ok(())
    }

    /// Send one raw protocol line.
    ///
    /// A write failure marks the session not-running, which hands control to
    /// the reconnect procedure once the receive loop notices.
    pub async fn send(&mut self, line: &str, hide: bool) -> Result<(), ClientError> {
        let result = self.sender.send(line, hide).await;
        if let Err(e) = &result {
            if e.is_transient() {
                self.running = false;
            }
        }
        result
    }

    /// Send `text` to `target`, split into as many PRIVMSGs as needed.
    ///
    /// `hide` only keeps the content out of the logs.
    pub async fn private_message(
        &mut self,
        target: &str,
        text: &str,
        hide: bool,
    ) -> Result<(), ClientError> {
        for chunk in split_message(text, self.config.max_line_len, self.config.max_splits) {
            self.send(&format!("PRIVMSG {target} :{chunk}"), hide).await?;
        }
        Ok(())
    }

    /// Say something in a channel, or privately to whoever sent a command.
    pub async fn say(&mut self, text: &str, channel: &str) -> Result<(), ClientError> {
        self.private_message(channel, text, false).await
    }

    /// CTCP ACTION (`/me`).
    pub async fn me(&mut self, text: &str, channel: &str) -> Result<(), ClientError> {
        self.say(&format!("\x01ACTION {text}\x01"), channel).await
    }

    /// Join a channel and remember it for rejoining after a reconnect.
    ///
    /// No acknowledgement is awaited; the channel set is updated even if the
    /// send fails, so the next session rejoins it.
    pub async fn join(&mut self, channel: &str) -> Result<(), ClientError> {
        tracing::info!("Joining {channel}.");
        let result = self.send(&format!("JOIN {channel}"), false).await;
        self.channels.insert(channel.to_string());
        result
    }

    /// Leave a channel. Ignored for names that are not `#` channels or that
    /// the bot is not in.
    pub async fn part(&mut self, channel: &str) -> Result<(), ClientError> {
        if !channel.starts_with('#') || !self.channels.contains(channel) {
            tracing::debug!("Not parting {channel}: not a joined channel");
            return Ok(());
        }
        tracing::info!("Parting from {channel}.");
        let result = self.send(&format!("PART {channel}"), false).await;
        self.channels.remove(channel);
        result
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.keepalive.record_ping(Instant::now());
        tracing::debug!("Pinging host.");
        let line = format!("PING {}", self.config.host);
        self.send(&line, true).await
    }

    pub async fn pong(&mut self, server: &str) -> Result<(), ClientError> {
        tracing::debug!("Ponging {server}");
        self.send(&format!("PONG {server}"), true).await
    }

    pub async fn quit(&mut self) -> Result<(), ClientError> {
        self.send("QUIT", false).await
    }

    /// Identify the nick to the identity service with the injected secret.
    pub async fn identify(&mut self) -> Result<(), ClientError> {
        let Some(secret) = self.credentials.secret() else {
            tracing::warn!("No credentials available, not identifying");
            return Ok(());
        };
        let service = self.config.identity_service.clone();
        let text = format!("IDENTIFY {} {secret}", self.config.nick);
        self.private_message(&service, &text, true).await
    }

    /// Send QUIT and close the socket.
    ///
    /// With `retry` the receive loop goes on to reconnect; without it the
    /// connection terminates and no further reconnects happen.
    pub async fn shut_down(&mut self, retry: bool) {
        tracing::info!("Shutting down.");
        let _ = self.quit().await;
        self.close(retry).await;
    }

    pub(crate) async fn close(&mut self, retry: bool) {
        self.running = false;
        if !retry {
            self.try_reconnect = false;
        }
        tracing::info!("Closing.");
        if let Some(mut writer) = self.sender.detach() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "Socket already closed");
            }
        }
    }

    /// Drop the writer after the link went away on its own.
    pub(crate) async fn detach(&mut self) {
        self.running = false;
        if let Some(mut writer) = self.sender.detach() {
            let _ = writer.shutdown().await;
        }
    }
}
