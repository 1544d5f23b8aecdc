//! Route guards
//!
//! Members must be logged in; the admin panel additionally requires the
//! single configured admin Discord ID. A logged-in non-admin gets a plain
//! 403, never a redirect, so the refusal is explicit.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::warn;

use super::session::Session;
use super::views;
use crate::config::AppConfig;
use crate::models::Identity;

/// The logged-in identity, or a redirect to `/login`
pub fn require_authenticated(session: &Session) -> Result<Identity, Response> {
    session
        .identity()
        .ok_or_else(|| Redirect::to("/login").into_response())
}

/// The admin identity, a redirect to `/login` when logged out, or 403
pub fn require_admin(session: &Session, config: &AppConfig) -> Result<Identity, Response> {
    let identity = require_authenticated(session)?;

    if identity.id != config.admin_id {
        warn!(
            "User {} ({}) denied access to admin panel",
            identity.username, identity.id
        );
        return Err((
            StatusCode::FORBIDDEN,
            Html(views::access_denied_page(Some(&identity))),
        )
            .into_response());
    }

    Ok(identity)
}
