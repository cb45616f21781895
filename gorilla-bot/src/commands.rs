//! Built-in bot commands.
//!
//! These are thin: each one checks permissions and calls straight into the
//! session API. Anything with real logic belongs in its own plugin.

use std::sync::Arc;

use async_trait::async_trait;
use gorilla_sdk::state::AdminError;
use gorilla_sdk::{Command, CommandKind, CommandRouter, Handler, Session};

/// Tell non-admins off. Returns whether `command.sender` is an admin.
async fn require_admin(
    session: &mut Session,
    channel: &str,
    command: &Command,
) -> anyhow::Result<bool> {
    if session.is_admin(&command.sender) {
        return Ok(true);
    }
    tracing::warn!(sender = %command.sender, command = %command.name, "Refused admin command");
    session.say("Ask a bot admin to perform this for you.", channel).await?;
    Ok(false)
}

/// `!ping`: check the bot is alive.
pub struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        _command: &Command,
    ) -> anyhow::Result<()> {
        session.say("Pong!", channel).await?;
        Ok(())
    }
}

/// `!join #a #b`: join channels (admins only).
pub struct Join;

#[async_trait]
impl Handler for Join {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if !require_admin(session, channel, command).await? {
            return Ok(());
        }
        if command.args.is_empty() {
            session
                .say("Please specify a channel to join (as !join #channel).", channel)
                .await?;
            return Ok(());
        }
        for chan in &command.args {
            session.join(chan).await?;
        }
        Ok(())
    }
}

/// `!part #a #b`: leave channels (admins only).
pub struct Part;

#[async_trait]
impl Handler for Part {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if !require_admin(session, channel, command).await? {
            return Ok(());
        }
        if command.args.is_empty() {
            session
                .say("Please specify which channel to part (as !part #channel).", channel)
                .await?;
            return Ok(());
        }
        for chan in &command.args {
            session.part(chan).await?;
        }
        Ok(())
    }
}

/// `!quit` / `!shutdown`: quit for good (admins only).
pub struct Quit;

#[async_trait]
impl Handler for Quit {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if require_admin(session, channel, command).await? {
            session.shut_down(false).await;
        }
        Ok(())
    }
}

/// `emergencyshutoff`: anyone may stop a misbehaving bot, but only by
/// private message.
pub struct EmergencyShutoff;

#[async_trait]
impl Handler for EmergencyShutoff {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if kind != CommandKind::Private {
            session
                .say("Please send this as a private message to shut me down.", channel)
                .await?;
            return Ok(());
        }
        tracing::error!("Emergency shutdown requested by {}.", command.sender);
        session.say("Shutting down.", channel).await?;
        session.shut_down(false).await;
        Ok(())
    }
}

/// `!addadmin nick...`: grant admin rights (admins only).
pub struct AddAdmin;

#[async_trait]
impl Handler for AddAdmin {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if !require_admin(session, channel, command).await? {
            return Ok(());
        }
        if command.args.is_empty() {
            session.say("Please specify which user to add.", channel).await?;
            return Ok(());
        }

        let mut added = Vec::new();
        for nick in &command.args {
            match session.add_admin(nick) {
                Ok(()) => added.push(nick.as_str()),
                Err(e) => session.say(&format!("{e}."), channel).await?,
            }
        }
        match added.as_slice() {
            [] => {}
            [one] => session.say(&format!("{one} is now a bot admin."), channel).await?,
            many => {
                let reply = format!("{} are now bot admins.", many.join(", "));
                session.say(&reply, channel).await?;
            }
        }
        Ok(())
    }
}

/// `!removeadmin nick...`: revoke admin rights (admins only). The last
/// admin can't be removed.
pub struct RemoveAdmin;

#[async_trait]
impl Handler for RemoveAdmin {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        if !require_admin(session, channel, command).await? {
            return Ok(());
        }
        if command.args.is_empty() {
            session.say("Please specify which admin to remove.", channel).await?;
            return Ok(());
        }

        let mut removed = Vec::new();
        for nick in &command.args {
            match session.remove_admin(nick) {
                Ok(()) => removed.push(nick.as_str()),
                Err(AdminError::LastAdmin(_)) => {
                    session
                        .say(
                            "You are the only bot administrator. Please add another admin \
                             or disconnect the bot before removing yourself.",
                            channel,
                        )
                        .await?;
                    break;
                }
                Err(e) => session.say(&format!("{e}."), channel).await?,
            }
        }
        match removed.as_slice() {
            [] => {}
            [one] => {
                session.say(&format!("{one} is no longer a bot admin."), channel).await?;
            }
            many => {
                let reply = format!("{} are no longer bot admins.", many.join(", "));
                session.say(&reply, channel).await?;
            }
        }
        Ok(())
    }
}

/// `!adminlist`: who may run admin commands.
pub struct AdminList;

#[async_trait]
impl Handler for AdminList {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        _kind: CommandKind,
        _command: &Command,
    ) -> anyhow::Result<()> {
        let admins: Vec<&str> = session.admins().iter().collect();
        let reply = match admins.as_slice() {
            [one] => format!("My bot admin is {one}."),
            many => format!("My bot admins are: {}.", many.join(", ")),
        };
        session.say(&reply, channel).await?;
        Ok(())
    }
}

/// A router with every built-in command registered.
pub fn router(prefix: &str) -> CommandRouter {
    let quit: Arc<dyn Handler> = Arc::new(Quit);
    let mut router = CommandRouter::new(prefix);
    router
        .command("ping", Arc::new(Ping))
        .command("join", Arc::new(Join))
        .command("part", Arc::new(Part))
        .command("quit", quit.clone())
        .command("shutdown", quit)
        .command("emergencyshutoff", Arc::new(EmergencyShutoff))
        .command("addadmin", Arc::new(AddAdmin))
        .command("removeadmin", Arc::new(RemoveAdmin))
        .command("adminlist", Arc::new(AdminList));
    router
}
