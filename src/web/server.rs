//! Router assembly and the HTTP(S) listener

use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::{
    compression::CompressionLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::info;

use super::admin::admin_router;
use super::oauth::IdentityProvider;
use super::session::{session_middleware, SessionManager};
use super::{pages, submit};
use crate::config::{AppConfig, TlsConfig};
use crate::logging::SharedLogBuffer;
use crate::membership::GuildApi;
use crate::notify::Notifier;
use crate::server_status::StatusProbe;
use crate::state::ApplicationStore;

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub guild_api: Arc<dyn GuildApi>,
    pub status_probe: Arc<dyn StatusProbe>,
    pub applications: Arc<dyn ApplicationStore>,
    pub notifier: Arc<dyn Notifier>,
    pub log_buffer: SharedLogBuffer,
}

/// All routes, with sessions, compression and request tracing applied.
/// Static assets are served from `public_dir`.
pub fn build_router(state: AppState, sessions: SessionManager, public_dir: &Path) -> Router {
    let static_files = Router::new()
        .nest_service("/js", ServeDir::new(public_dir.join("js")))
        .nest_service("/css", ServeDir::new(public_dir.join("css")))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=86400"),
        ));

    Router::new()
        .route("/", get(pages::home))
        .route("/login", get(pages::login))
        .route("/auth/discord", get(pages::begin_oauth))
        .route("/auth/discord/callback", get(pages::oauth_callback))
        .route("/logout", get(pages::logout))
        .route("/dashboard", get(pages::dashboard))
        .route("/rules", get(pages::rules))
        .route("/applications-form", get(pages::applications_form))
        .route("/whitelistform", get(pages::whitelist_form))
        .route("/submit-application", post(submit::submit_application))
        .route("/application-submitted", get(pages::application_submitted))
        .route("/faq", get(pages::faq))
        .route("/server-status", get(pages::server_status))
        .nest("/admin", admin_router())
        .fallback(pages::not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(sessions, session_middleware))
        .merge(static_files)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` on `port`, over HTTPS when TLS is configured
pub async fn start_web_server(
    app: Router,
    port: u16,
    tls: Option<&TlsConfig>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match tls {
        Some(tls) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", tls.cert_path.display());
            info!("  Private key: {}", tls.key_path.display());

            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| anyhow::anyhow!(
                    "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                    e, tls.cert_path.display(), tls.key_path.display()
                ))?;

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
