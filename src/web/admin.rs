//! Admin panel routes and handlers
//!
//! Provides:
//! - The submitted applications listing, newest first
//! - Recent logs and a live log stream

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use super::auth::require_admin;
use super::server::AppState;
use super::session::Session;
use super::views;

/// Create admin router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(applications))
        .route("/logs", get(logs_page))
        .route("/logs/stream", get(logs_stream))
}

/// GET /admin - All submitted applications, newest first
async fn applications(State(state): State<AppState>, session: Session) -> Response {
    let admin = match require_admin(&session, &state.config) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    match state.applications.list_newest_first().await {
        Ok(applications) => {
            info!("Admin {} viewed {} applications", admin.id, applications.len());
            let notifications = session.take_notifications();
            Html(views::admin_page(&admin, &applications, &notifications)).into_response()
        }
        Err(e) => {
            error!("Error fetching applications: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load admin panel.").into_response()
        }
    }
}

/// GET /admin/logs - Recent log lines
async fn logs_page(State(state): State<AppState>, session: Session) -> Response {
    let admin = match require_admin(&session, &state.config) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let recent_logs = state.log_buffer.get_recent(200);
    Html(views::logs_page(&admin, &recent_logs)).into_response()
}

/// GET /admin/logs/stream - New log lines as server-sent events
async fn logs_stream(State(state): State<AppState>, session: Session) -> Response {
    if let Err(response) = require_admin(&session, &state.config) {
        return response;
    }

    let rx = state.log_buffer.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => serde_json::to_string(&entry)
            .ok()
            .map(|json| Ok::<_, Infallible>(Event::default().data(json))),
        // Lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response()
}
