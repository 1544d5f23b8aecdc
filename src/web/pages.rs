//! Member-facing page handlers and the login/logout flow

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::auth::require_authenticated;
use super::server::AppState;
use super::session::Session;
use super::views;
use crate::membership::{classify, RoleClassification};
use crate::models::{GuildSummary, Identity, Notification};
use crate::server_status::ServerStatus;

/// Everything a member page shows
#[derive(Debug, Clone)]
pub struct MemberView {
    pub identity: Identity,
    /// The target guild, if the user is in it
    pub server: Option<GuildSummary>,
    pub roles: RoleClassification,
    pub member_count: u64,
    pub status: ServerStatus,
    pub notifications: Vec<Notification>,
}

/// Gather the member view. Lookups run one after another and each one falls
/// back to its default on failure, so this never fails.
pub async fn load_member_view(
    state: &AppState,
    session: &Session,
    identity: Identity,
) -> MemberView {
    let member = state.guild_api.fetch_member(&identity.id).await;
    let roles = classify(
        &state.config.roles,
        member.as_ref().map(|m| m.roles.as_slice()),
    );

    let member_count = state.guild_api.fetch_member_count().await.unwrap_or(0);
    let status = state.status_probe.check().await;
    let server = identity.find_guild(&state.config.discord.guild_id).cloned();
    let notifications = session.take_notifications();

    MemberView {
        identity,
        server,
        roles,
        member_count,
        status,
        notifications,
    }
}

async fn member_page(
    state: &AppState,
    session: &Session,
    render: fn(&MemberView) -> String,
) -> Response {
    let identity = match require_authenticated(session) {
        Ok(identity) => identity,
        Err(redirect) => return redirect,
    };

    let view = load_member_view(state, session, identity).await;
    Html(render(&view)).into_response()
}

/// GET / - Landing page
pub async fn home(State(state): State<AppState>, session: Session) -> Html<String> {
    let status = state.status_probe.check().await;
    let user = session.identity();

    let is_whitelisted = match &user {
        Some(identity) => {
            let member = state.guild_api.fetch_member(&identity.id).await;
            let roles = member.as_ref().map(|m| m.roles.as_slice());
            classify(&state.config.roles, roles).is_whitelisted
        }
        None => false,
    };

    Html(views::home_page(user.as_ref(), is_whitelisted, &status))
}

/// GET /dashboard
pub async fn dashboard(State(state): State<AppState>, session: Session) -> Response {
    member_page(&state, &session, views::dashboard_page).await
}

/// GET /rules
pub async fn rules(State(state): State<AppState>, session: Session) -> Response {
    member_page(&state, &session, views::rules_page).await
}

/// GET /applications-form
pub async fn applications_form(State(state): State<AppState>, session: Session) -> Response {
    member_page(&state, &session, |view| {
        views::application_form_page(view, "Community Application")
    })
    .await
}

/// GET /whitelistform
pub async fn whitelist_form(State(state): State<AppState>, session: Session) -> Response {
    member_page(&state, &session, |view| {
        views::application_form_page(view, "Whitelist Application")
    })
    .await
}

/// GET /application-submitted
pub async fn application_submitted(session: Session) -> Response {
    let identity = match require_authenticated(&session) {
        Ok(identity) => identity,
        Err(redirect) => return redirect,
    };
    let notifications = session.take_notifications();
    Html(views::application_submitted_page(Some(&identity), &notifications)).into_response()
}

/// GET /faq
pub async fn faq(session: Session) -> Html<String> {
    Html(views::faq_page(session.identity().as_ref()))
}

/// GET /server-status - JSON polled by the status widget
pub async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.status_probe.check().await)
}

/// GET /login
pub async fn login(session: Session) -> Html<String> {
    let notifications = session.take_notifications();
    Html(views::login_page(session.identity().as_ref(), &notifications))
}

/// GET /auth/discord - Start the OAuth handshake
pub async fn begin_oauth(State(state): State<AppState>, session: Session) -> Redirect {
    let oauth_state = uuid::Uuid::new_v4().to_string();
    session.set_oauth_state(oauth_state.clone());
    Redirect::to(&state.identity_provider.authorize_url(&oauth_state))
}

/// Query parameters from the Discord OAuth callback
#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/discord/callback - Finish the handshake and log the user in
pub async fn oauth_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let expected_state = session.take_oauth_state();

    if let Some(error) = params.error {
        warn!("OAuth provider returned error: {}", error);
        session.push_notification(Notification::error("Login was cancelled or denied."));
        return Redirect::to("/login");
    }

    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        warn!("OAuth callback without code or state");
        return Redirect::to("/login");
    };

    if expected_state.as_deref() != Some(returned_state.as_str()) {
        warn!("OAuth state mismatch, rejecting callback");
        session.push_notification(Notification::error("Login expired, please try again."));
        return Redirect::to("/login");
    }

    match state.identity_provider.exchange_code(&code).await {
        Ok(identity) => {
            info!("User {} ({}) logged in", identity.username, identity.id);
            let welcome = format!("Logged in as {}", identity.display_name);
            let in_guild = identity.find_guild(&state.config.discord.guild_id).is_some();
            session.login(identity);
            session.push_notification(Notification::success(welcome));
            if !in_guild {
                session.push_notification(Notification::info(
                    "Join our Discord server to get whitelisted and unlock queue priority.",
                ));
            }
            Redirect::to("/dashboard")
        }
        Err(e) => {
            error!("OAuth login failed: {}", e);
            session.push_notification(Notification::error("Login failed, please try again."));
            Redirect::to("/login")
        }
    }
}

/// GET /logout
pub async fn logout(session: Session) -> Redirect {
    if let Some(identity) = session.identity() {
        info!("User {} ({}) logged out", identity.username, identity.id);
    }
    session.logout();
    Redirect::to("/")
}

/// Fallback for unmatched routes
pub async fn not_found(session: Session) -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        Html(views::not_found_page(session.identity().as_ref())),
    )
}
