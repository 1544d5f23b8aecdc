//! Router tests against in-memory fakes

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use tower::ServiceExt;

use super::{build_router, AppState, IdentityProvider, SessionManager};
use crate::config::app::tests::{base_env, config_from};
use crate::error::{AppError, Result};
use crate::logging::create_log_buffer;
use crate::membership::{GuildApi, GuildMember};
use crate::models::{GuildSummary, Identity};
use crate::notify::Notifier;
use crate::server_status::{ServerStatus, StatusProbe};
use crate::state::applications::tests::submission;
use crate::state::{ApplicationStore, ApplicationSubmission, SessionData, SessionStore};

struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://provider.test/authorize?client_id=client&state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<Identity> {
        let id = match code {
            "member" => "42",
            "admin" => "admin-1",
            _ => {
                return Err(AppError::OAuth {
                    message: "invalid code".to_string(),
                })
            }
        };
        Ok(Identity {
            id: id.to_string(),
            username: format!("user{}", id),
            display_name: format!("User {}", id),
            avatar: None,
            guilds: vec![GuildSummary {
                id: "guild-1".to_string(),
                name: "Los Santos Life".to_string(),
                icon: None,
                owner: false,
            }],
            access_token: Some("token".to_string()),
        })
    }
}

struct FakeGuildApi;

#[async_trait]
impl GuildApi for FakeGuildApi {
    async fn fetch_member(&self, user_id: &str) -> Option<GuildMember> {
        (user_id == "42").then(|| GuildMember {
            roles: vec!["wl".to_string(), "gold".to_string()],
        })
    }

    async fn fetch_member_count(&self) -> Option<u64> {
        Some(128)
    }
}

/// Discord unreachable: every lookup fails
struct DownGuildApi;

#[async_trait]
impl GuildApi for DownGuildApi {
    async fn fetch_member(&self, _user_id: &str) -> Option<GuildMember> {
        None
    }

    async fn fetch_member_count(&self) -> Option<u64> {
        None
    }
}

struct OfflineProbe;

#[async_trait]
impl StatusProbe for OfflineProbe {
    async fn check(&self) -> ServerStatus {
        ServerStatus::offline()
    }
}

struct FakeProbe;

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn check(&self) -> ServerStatus {
        ServerStatus {
            online: true,
            players: 12,
            max_players: 64,
            hostname: Some("Test City".to_string()),
        }
    }
}

#[derive(Default)]
struct MemoryApplications {
    documents: parking_lot::Mutex<Vec<ApplicationSubmission>>,
}

#[async_trait]
impl ApplicationStore for MemoryApplications {
    async fn insert(&self, submission: ApplicationSubmission) -> Result<()> {
        self.documents.lock().push(submission);
        Ok(())
    }

    async fn list_newest_first(&self) -> Result<Vec<ApplicationSubmission>> {
        Ok(crate::state::applications::sort_newest_first(
            self.documents.lock().clone(),
        ))
    }
}

struct FailingApplications;

#[async_trait]
impl ApplicationStore for FailingApplications {
    async fn insert(&self, _submission: ApplicationSubmission) -> Result<()> {
        Err(AppError::Internal {
            message: "store unavailable".to_string(),
        })
    }

    async fn list_newest_first(&self) -> Result<Vec<ApplicationSubmission>> {
        Err(AppError::Internal {
            message: "store unavailable".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: parking_lot::Mutex<usize>,
    fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_submission(&self, _submission: &ApplicationSubmission) -> Result<()> {
        if self.fail {
            return Err(AppError::Upstream {
                endpoint: "webhook".to_string(),
                status: 500,
            });
        }
        *self.sent.lock() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct MemorySessions {
    sessions: parking_lot::Mutex<HashMap<String, SessionData>>,
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        Ok(self.sessions.lock().get(id).filter(|s| !s.is_expired()).cloned())
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<()> {
        self.sessions.lock().insert(id.to_string(), data.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.sessions.lock().remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok(before - sessions.len())
    }
}

struct Harness {
    app: Router,
    applications: Arc<MemoryApplications>,
    notifier: Arc<RecordingNotifier>,
    sessions: Arc<MemorySessions>,
}

struct Backends {
    applications: Arc<dyn ApplicationStore>,
    notifier: Arc<RecordingNotifier>,
    sessions: Arc<MemorySessions>,
    guild_api: Arc<dyn GuildApi>,
    status_probe: Arc<dyn StatusProbe>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            applications: Arc::new(MemoryApplications::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            sessions: Arc::new(MemorySessions::default()),
            guild_api: Arc::new(FakeGuildApi),
            status_probe: Arc::new(FakeProbe),
        }
    }
}

fn router_with(backends: Backends) -> Router {
    let config = config_from(&base_env()).unwrap();
    let sessions = SessionManager::new(
        backends.sessions,
        &config.session.secret,
        Duration::from_secs(3600),
    )
    .unwrap();

    let state = AppState {
        config: Arc::new(config),
        identity_provider: Arc::new(FakeProvider),
        guild_api: backends.guild_api,
        status_probe: backends.status_probe,
        applications: backends.applications,
        notifier: backends.notifier,
        log_buffer: create_log_buffer(100),
    };

    build_router(state, sessions, Path::new("public"))
}

fn harness() -> Harness {
    let applications = Arc::new(MemoryApplications::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let sessions = Arc::new(MemorySessions::default());
    let app = router_with(Backends {
        applications: applications.clone(),
        notifier: notifier.clone(),
        sessions: sessions.clone(),
        ..Default::default()
    });
    Harness {
        app,
        applications,
        notifier,
        sessions,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(form) => builder
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    send(app, "GET", uri, cookie, None).await
}

fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
}

/// `name=...` from the response's Set-Cookie, ready for a Cookie header
fn cookie_named(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(prefix.as_str()))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn session_cookie(response: &Response<Body>) -> Option<String> {
    cookie_named(response, "sid")
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run the OAuth flow with `code`, returning the logged-in cookie
async fn login(app: &Router, code: &str) -> String {
    let start = get(app, "/auth/discord", None).await;
    assert_eq!(start.status(), StatusCode::SEE_OTHER);
    let handshake = cookie_named(&start, "oauth_state").expect("handshake cookie");
    let redirect = location(&start).unwrap();
    let state = redirect.split("state=").nth(1).unwrap().to_string();

    let callback = get(
        app,
        &format!("/auth/discord/callback?code={}&state={}", code, state),
        Some(&handshake),
    )
    .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&callback).as_deref(), Some("/dashboard"));
    // handshake cookie is cleared once used
    assert_eq!(cookie_named(&callback, "oauth_state").as_deref(), Some("oauth_state="));

    session_cookie(&callback).expect("session cookie")
}

#[tokio::test]
async fn test_dashboard_requires_login() {
    let h = harness();
    for path in ["/dashboard", "/rules", "/applications-form", "/whitelistform"] {
        let response = get(&h.app, path, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", path);
        assert_eq!(location(&response).as_deref(), Some("/login"));
    }
}

#[tokio::test]
async fn test_login_flow_reaches_dashboard() {
    let h = harness();
    let cookie = login(&h.app, "member").await;

    let response = get(&h.app, "/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("Logged in as User 42"));
    assert!(body.contains("Los Santos Life"));
    assert!(body.contains("Whitelisted"));
    assert!(body.contains("Gold Priority"));
    assert!(body.contains("128"));
}

#[tokio::test]
async fn test_notifications_shown_once() {
    let h = harness();
    let cookie = login(&h.app, "member").await;

    let first = body_text(get(&h.app, "/dashboard", Some(&cookie)).await).await;
    let second = body_text(get(&h.app, "/dashboard", Some(&cookie)).await).await;

    assert!(first.contains("Logged in as"));
    assert!(!second.contains("Logged in as"));
}

#[tokio::test]
async fn test_state_mismatch_rejected() {
    let h = harness();
    let start = get(&h.app, "/auth/discord", None).await;
    let cookie = cookie_named(&start, "oauth_state").unwrap();

    let callback = get(
        &h.app,
        "/auth/discord/callback?code=member&state=forged",
        Some(&cookie),
    )
    .await;
    assert_eq!(location(&callback).as_deref(), Some("/login"));

    let dashboard = get(&h.app, "/dashboard", Some(&cookie)).await;
    assert_eq!(location(&dashboard).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_handshake_stores_no_session() {
    let h = harness();
    for _ in 0..50 {
        let start = get(&h.app, "/auth/discord", None).await;
        assert_eq!(start.status(), StatusCode::SEE_OTHER);
        assert!(session_cookie(&start).is_none());
    }
    assert!(h.sessions.sessions.lock().is_empty());

    login(&h.app, "member").await;
    assert_eq!(h.sessions.sessions.lock().len(), 1);
}

#[tokio::test]
async fn test_state_cookie_is_single_use() {
    let h = harness();
    let start = get(&h.app, "/auth/discord", None).await;
    let handshake = cookie_named(&start, "oauth_state").unwrap();
    let state = location(&start).unwrap().split("state=").nth(1).unwrap().to_string();
    let uri = format!("/auth/discord/callback?code=member&state={}", state);

    let first = get(&h.app, &uri, Some(&handshake)).await;
    assert_eq!(location(&first).as_deref(), Some("/dashboard"));

    // A replay without the cleared cookie has nothing to match against
    let replay = get(&h.app, &uri, None).await;
    assert_eq!(location(&replay).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_provider_error_redirects_to_login() {
    let h = harness();
    let response = get(&h.app, "/auth/discord/callback?error=access_denied", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_admin_guard() {
    let h = harness();

    let anonymous = get(&h.app, "/admin", None).await;
    assert_eq!(location(&anonymous).as_deref(), Some("/login"));

    let member = login(&h.app, "member").await;
    let denied = get(&h.app, "/admin", Some(&member)).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert!(body_text(denied).await.contains("Access Denied"));

    let logs = get(&h.app, "/admin/logs", Some(&member)).await;
    assert_eq!(logs.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_newest_first() {
    let h = harness();
    let now = Utc::now();
    h.applications
        .insert(submission("older", now - chrono::Duration::hours(2)))
        .await
        .unwrap();
    h.applications.insert(submission("newest", now)).await.unwrap();
    h.applications
        .insert(submission("middle", now - chrono::Duration::hours(1)))
        .await
        .unwrap();

    let admin = login(&h.app, "admin").await;
    let response = get(&h.app, "/admin", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    let newest = body.find("newest-id").unwrap();
    let middle = body.find("middle-id").unwrap();
    let older = body.find("older-id").unwrap();
    assert!(newest < middle && middle < older);
}

#[tokio::test]
async fn test_submit_persists_and_notifies() {
    let h = harness();
    let before = Utc::now();

    let response = send(
        &h.app,
        "POST",
        "/submit-application",
        None,
        Some("discord_id=42&name=jdoe&age=21&whyApply=fun&rulesLocation=discord"),
    )
    .await;
    let after = Utc::now();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/application-submitted"));

    let stored = h.applications.documents.lock().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].discord_name.as_deref(), Some("jdoe"));
    assert_eq!(stored[0].why_apply.as_deref(), Some("fun"));
    assert_eq!(stored[0].rules_location.as_deref(), Some("discord"));
    assert!(stored[0].submitted_at >= before && stored[0].submitted_at <= after);
    assert_eq!(*h.notifier.sent.lock(), 1);
}

#[tokio::test]
async fn test_submit_store_failure() {
    let notifier = Arc::new(RecordingNotifier::default());
    let app = router_with(Backends {
        applications: Arc::new(FailingApplications),
        notifier: notifier.clone(),
        ..Default::default()
    });

    let response = send(&app, "POST", "/submit-application", None, Some("name=jdoe")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(location(&response).is_none());
    assert_eq!(*notifier.sent.lock(), 0);
    assert_eq!(body_text(response).await, "Something went wrong!");
}

#[tokio::test]
async fn test_submit_webhook_failure_still_redirects() {
    let applications = Arc::new(MemoryApplications::default());
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let app = router_with(Backends {
        applications: applications.clone(),
        notifier,
        ..Default::default()
    });

    let response = send(&app, "POST", "/submit-application", None, Some("name=jdoe")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/application-submitted"));
    assert_eq!(applications.documents.lock().len(), 1);
}

#[tokio::test]
async fn test_logout() {
    let h = harness();

    let anonymous = get(&h.app, "/logout", None).await;
    assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&anonymous).as_deref(), Some("/"));

    let cookie = login(&h.app, "member").await;
    let response = get(&h.app, "/logout", Some(&cookie)).await;
    assert_eq!(location(&response).as_deref(), Some("/"));

    let dashboard = get(&h.app, "/dashboard", Some(&cookie)).await;
    assert_eq!(location(&dashboard).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = harness();
    let response = get(&h.app, "/no-such-page", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("404"));
}

#[tokio::test]
async fn test_server_status_json() {
    let h = harness();
    let response = get(&h.app, "/server-status", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["online"], true);
    assert_eq!(json["players"], 12);
    assert_eq!(json["maxPlayers"], 64);
}

#[tokio::test]
async fn test_public_pages_render_without_login() {
    let h = harness();
    for path in ["/", "/login", "/faq"] {
        let response = get(&h.app, path, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn test_pages_render_when_lookups_fail() {
    let app = router_with(Backends {
        guild_api: Arc::new(DownGuildApi),
        status_probe: Arc::new(OfflineProbe),
        ..Default::default()
    });
    let cookie = login(&app, "member").await;

    for path in ["/dashboard", "/rules", "/applications-form", "/whitelistform"] {
        let response = get(&app, path, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);

        let body = body_text(response).await;
        assert!(body.contains("Not whitelisted"), "{}", path);
        assert!(body.contains("No queue priority"), "{}", path);
        assert!(body.contains("Members: <strong>0</strong>"), "{}", path);
        assert!(body.contains("Server is OFFLINE"), "{}", path);
    }

    let home = get(&app, "/", Some(&cookie)).await;
    assert_eq!(home.status(), StatusCode::OK);
    assert!(body_text(home).await.contains("Server is OFFLINE"));
}
