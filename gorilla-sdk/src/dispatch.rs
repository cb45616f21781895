//! Dispatch hook and a command router built on it.
//!
//! The connection hands every received [`Line`] to a [`Dispatcher`]. The
//! bundled [`CommandRouter`] turns bot commands found in `PRIVMSG`s into
//! calls on registered [`Handler`]s:
//!
//! - `!join #rust` in a channel → [`CommandKind::Channel`]
//! - `GorillaBot: join #rust` in a channel → [`CommandKind::Direct`]
//! - `join #rust` (or `!join #rust`) sent privately → [`CommandKind::Private`],
//!   replies go back to the sender

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::line::Line;
use crate::session::Session;

/// Consumes every complete line the connection receives.
#[async_trait]
pub trait Dispatcher: Send {
    async fn dispatch(&mut self, session: &mut Session, line: &Line) -> anyhow::Result<()>;
}

/// How a command reached the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Prefixed command in a channel.
    Channel,
    /// Addressed to the bot by nick in a channel.
    Direct,
    /// Private message to the bot.
    Private,
}

/// A recognized command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercased command name without prefix.
    pub name: String,
    pub args: Vec<String>,
    pub sender: String,
    pub kind: CommandKind,
    /// Where replies go: the channel, or the sender for private messages.
    pub reply_to: String,
}

impl Command {
    /// Recognize a command in `line`, as seen by a bot called `nick`.
    pub fn parse(line: &Line, nick: &str, prefix: &str) -> Option<Self> {
        if line.command() != Some("PRIVMSG") {
            return None;
        }
        let sender = line.sender()?;
        if sender.eq_ignore_ascii_case(nick) {
            return None;
        }
        let target = line.params().first()?;
        let first = usize::from(line.prefix().is_some()) + 2;
        let text = line.text_from(first)?;
        let mut words = text.split_whitespace();

        let (kind, name, reply_to) = if target.eq_ignore_ascii_case(nick) {
            let word = words.next()?;
            let name = word.strip_prefix(prefix).unwrap_or(word);
            (CommandKind::Private, name, sender.to_string())
        } else if text.starts_with(prefix) {
            // `! join` is not a command: the name must follow the prefix directly.
            let name = words.next()?.strip_prefix(prefix)?;
            (CommandKind::Channel, name, target.clone())
        } else {
            let addressed = words.next()?;
            let called = addressed.trim_end_matches([':', ',']);
            if called.len() == addressed.len() || !called.eq_ignore_ascii_case(nick) {
                return None;
            }
            let word = words.next()?;
            let name = word.strip_prefix(prefix).unwrap_or(word);
            (CommandKind::Direct, name, target.clone())
        };

        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_lowercase(),
            args: words.map(str::to_string).collect(),
            sender: sender.to_string(),
            kind,
            reply_to,
        })
    }

    pub fn args_str(&self) -> String {
        self.args.join(" ")
    }
}

/// A bot command implementation.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()>;
}

/// Routes recognized commands to handlers by name.
pub struct CommandRouter {
    prefix: String,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new("!")
    }
}

impl CommandRouter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `name` (case-insensitive).
    pub fn command(&mut self, name: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.handlers.insert(name.to_lowercase(), handler);
        self
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_lowercase())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl Dispatcher for CommandRouter {
    async fn dispatch(&mut self, session: &mut Session, line: &Line) -> anyhow::Result<()> {
        let Some(command) = Command::parse(line, session.nick(), &self.prefix) else {
            return Ok(());
        };
        let Some(handler) = self.handlers.get(&command.name).cloned() else {
            tracing::debug!(command = %command.name, "Unknown command");
            return Ok(());
        };
        tracing::info!(
            command = %command.name,
            sender = %command.sender,
            kind = ?command.kind,
            "Running command"
        );
        let channel = command.reply_to.clone();
        handler
            .handle(session, &channel, command.kind, &command)
            .await
    }
}
