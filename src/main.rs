use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};

/// Community portal: Discord login, whitelist applications and admin review
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen on this port instead of PORT
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,
}

mod config;
mod error;
mod logging;
mod membership;
mod models;
mod notify;
mod server_status;
mod state;
mod web;

use config::AppConfig;
use membership::DiscordGuildApi;
use notify::WebhookNotifier;
use server_status::FivemStatusProbe;
use state::{JsonApplicationStore, JsonSessionStore, SessionStore, SharedSessionStore};
use web::{build_router, start_web_server, AppState, DiscordOAuth, SessionManager};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Create log buffer for web admin panel
    let log_buffer = logging::create_log_buffer(1000);
    logging::init_tracing(log_buffer.clone());

    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    if args.check_config {
        info!("Configuration OK");
        info!("  Guild: {}", config.discord.guild_id);
        info!("  Database: {}", config.storage.database_dir().display());
        info!("  Priority tiers configured: {}", config.roles.tiers.entries().len());
        info!("  Game server: {}", config.game_server_addr.as_deref().unwrap_or("not set"));
        info!("  Webhook: {}", if config.webhook_url.is_some() { "set" } else { "not set" });
        return Ok(());
    }

    if config.game_server_addr.is_none() {
        warn!("FIVEM_SERVER_IP not set; server status will always show offline");
    }
    if config.webhook_url.is_none() {
        warn!("WEBHOOK_URL not set; application submissions will not be announced");
    }

    let http_client = reqwest::Client::new();

    info!("Opening database at {}...", config.storage.database_dir().display());
    let applications =
        JsonApplicationStore::open(config.storage.collection_path("applications")).await?;
    info!("Loaded {} applications", applications.count().await);

    let session_store: SharedSessionStore =
        Arc::new(JsonSessionStore::open(config.storage.database_dir().join("sessions")).await?);
    let mut sessions = SessionManager::new(
        session_store.clone(),
        &config.session.secret,
        config.session.ttl,
    )?;
    sessions.secure_cookie = config.tls.is_some();

    spawn_session_cleanup(session_store);

    let state = AppState {
        identity_provider: Arc::new(DiscordOAuth::new(
            &config.oauth,
            http_client.clone(),
            config.http_timeout,
        )),
        guild_api: Arc::new(DiscordGuildApi::new(
            http_client.clone(),
            &config.discord,
            config.http_timeout,
        )),
        status_probe: Arc::new(FivemStatusProbe::new(
            http_client.clone(),
            config.game_server_addr.clone(),
        )),
        applications: Arc::new(applications),
        notifier: Arc::new(WebhookNotifier::new(
            http_client,
            config.webhook_url.clone(),
            config.http_timeout,
        )),
        log_buffer,
        config: Arc::new(config),
    };

    let port = state.config.port;
    let tls = state.config.tls.clone();
    let app = build_router(state, sessions, Path::new("public"));

    if let Err(e) = start_web_server(app, port, tls.as_ref()).await {
        error!("Web server error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Hourly sweep of expired sessions
fn spawn_session_cleanup(store: SharedSessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired sessions", removed),
                Err(e) => error!("Session cleanup failed: {}", e),
            }
        }
    });
}
