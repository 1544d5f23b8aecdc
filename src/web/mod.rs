//! Web server for the community portal
//!
//! Handles Discord login, the member pages, application submission and the
//! admin panel.

mod admin;
mod auth;
mod oauth;
mod pages;
mod server;
mod session;
mod submit;
mod views;

#[cfg(test)]
mod tests;

pub use oauth::{DiscordOAuth, IdentityProvider};
pub use server::{build_router, start_web_server, AppState};
pub use session::SessionManager;
