//! # chathub
//!
//! Chat hub server binary: loads settings, wires the hub to its store and
//! authenticator, and serves HTTP/WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chathub_core::Identity;
use chathub_server::collab::{InMemoryMessageStore, JwtAuthenticator};
use chathub_server::config::ServerConfig;
use chathub_server::server::ChatServer;
use chathub_settings::ChatHubSettings;
use chrono::TimeDelta;
use clap::{Parser, Subcommand};

/// Real-time chat hub server.
#[derive(Parser, Debug)]
#[command(name = "chathub", about = "Real-time chat hub server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.chathub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bearer token signed with the configured secret.
    Token {
        /// Stable user ID.
        user_id: String,
        /// Display name.
        username: String,
        /// Token lifetime in hours.
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<ChatHubSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(chathub_settings::settings_path);
        chathub_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    fn server_config(&self, settings: &ChatHubSettings) -> ServerConfig {
        let mut config = ServerConfig::from_settings(settings);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

fn issue_token(settings: &ChatHubSettings, identity: &Identity, ttl_hours: i64) -> Result<String> {
    JwtAuthenticator::new(&settings.auth.jwt_secret)
        .issue(identity, TimeDelta::hours(ttl_hours))
        .context("Failed to sign token")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    // Ignored CHATHUB_* overrides warn while loading, before logging is configured.
    let settings = tracing::subscriber::with_default(
        chathub_core::logging::bootstrap_subscriber(),
        || args.load_settings(),
    )?;

    if let Some(Command::Token {
        user_id,
        username,
        ttl_hours,
    }) = &args.command
    {
        let token = issue_token(&settings, &Identity::new(user_id, username), *ttl_hours)?;
        println!("{token}");
        return Ok(());
    }

    chathub_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = chathub_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = args.server_config(&settings);
    let server = ChatServer::new(
        config,
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(JwtAuthenticator::new(&settings.auth.jwt_secret)),
        metrics,
    );

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        policy = ?server.config().hub.duplicate_policy,
        queue = server.config().hub.send_queue_capacity,
        "chat hub listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().track(handle);
    server.shutdown().graceful_shutdown(None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
