//! Bot configuration.
//!
//! Config file lives at `~/.config/gorilla/bot.toml` unless `--config` says
//! otherwise. Every field is optional; missing ones fall back to the
//! [`ConnectConfig`] defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use gorilla_sdk::ConnectConfig;
use serde::Deserialize;

/// Default command prefix.
pub const DEFAULT_PREFIX: &str = "!";

/// Bot configuration as read from `bot.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IRC server host name.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub nick: Option<String>,
    /// Username (ident). Defaults to the nick.
    pub ident: Option<String>,
    pub realname: Option<String>,
    /// Channels to join on connect, in order.
    pub channels: Option<Vec<String>>,
    /// Nicks allowed to run admin commands.
    pub admins: Option<Vec<String>>,
    /// Nick service to identify with. Default: NickServ
    pub identity_service: Option<String>,
    /// Command prefix. Default: `!`
    pub prefix: Option<String>,
    /// Maximum characters per PRIVMSG.
    pub max_line_len: Option<usize>,
    /// Seconds between reconnect attempts.
    pub reconnect_delay_secs: Option<u64>,
    pub max_reconnects: Option<u32>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gorilla")
}

pub fn default_path() -> PathBuf {
    config_dir().join("bot.toml")
}

impl Config {
    /// Load from an explicit path, which must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("bad config file {}", path.display()))
    }

    /// Load from the default location, or defaults when there is no file.
    pub fn load_default() -> Result<Self> {
        let path = default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
    }

    /// Merge over the defaults and check the result is usable.
    pub fn resolve(&self) -> Result<ConnectConfig> {
        let defaults = ConnectConfig::default();
        let nick = self.nick.clone().unwrap_or(defaults.nick.clone());
        let resolved = ConnectConfig {
            host: self.host.clone().unwrap_or(defaults.host.clone()),
            port: self.port.unwrap_or(defaults.port),
            ident: self.ident.clone().unwrap_or_else(|| nick.clone()),
            realname: self.realname.clone().unwrap_or(defaults.realname.clone()),
            channels: self.channels.clone().unwrap_or_default(),
            admins: self.admins.clone().unwrap_or_default(),
            identity_service: self
                .identity_service
                .clone()
                .unwrap_or(defaults.identity_service.clone()),
            max_line_len: self.max_line_len.unwrap_or(defaults.max_line_len),
            reconnect_delay: self
                .reconnect_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_delay),
            max_reconnects: self.max_reconnects.unwrap_or(defaults.max_reconnects),
            nick,
            ..defaults
        };

        if resolved.nick.trim().is_empty() || resolved.nick.contains(char::is_whitespace) {
            bail!("nick must be a single non-empty word");
        }
        if resolved.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if resolved.admins.is_empty() {
            bail!("at least one admin is required");
        }
        if resolved.max_line_len == 0 {
            bail!("max_line_len must be greater than zero");
        }
        if let Some(bad) = resolved.channels.iter().find(|c| !c.starts_with(['#', '&'])) {
            bail!("{bad} is not a channel name");
        }
        if self.prefix().is_empty() {
            bail!("prefix must not be empty");
        }
        Ok(resolved)
    }
}
