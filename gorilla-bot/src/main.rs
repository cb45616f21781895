//! gorilla-bot: connect to IRC, join the configured channels and serve
//! the built-in commands until told to quit.
//!
//!   gorilla-bot --config ./bot.toml
//!
//! The NickServ password is read from `--password` or `GORILLA_PASSWORD`.
//! Ctrl-C quits cleanly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gorilla_sdk::Connection;
use gorilla_sdk::credentials::{CredentialProvider, NoCredentials, StaticCredentials};

use gorilla_bot::commands;
use gorilla_bot::config::Config;

#[derive(Parser)]
#[command(name = "gorilla-bot", about = "An IRC bot")]
struct Args {
    /// Config file (default: ~/.config/gorilla/bot.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Password to identify with (or set GORILLA_PASSWORD env var)
    #[arg(long, env = "GORILLA_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gorilla_bot=info,gorilla_sdk=info".into()),
        )
        .init();

    let args = Args::parse();

    let file = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let connect = file.resolve()?;

    let credentials: Arc<dyn CredentialProvider> = match args.password {
        Some(secret) if !secret.is_empty() => Arc::new(StaticCredentials::new(secret)),
        _ => {
            tracing::warn!("No password given; not identifying with {}.", connect.identity_service);
            Arc::new(NoCredentials)
        }
    };

    let mut router = commands::router(file.prefix());
    let mut conn = Connection::new(connect, credentials);
    tracing::info!("{conn}");

    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = conn.run(&mut router, interrupt).await {
        tracing::error!(error = %e, "Bot stopped");
        return Err(e.into());
    }
    tracing::info!("Bye.");
    Ok(())
}
