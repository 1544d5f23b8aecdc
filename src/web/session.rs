//! Cookie-keyed server-side sessions
//!
//! The `sid` cookie carries `<session id>.<signature>`, where the signature is
//! an HMAC-SHA256 of the ID under `SESSION_SECRET`. Session contents live in a
//! [`SessionStore`]; the middleware loads them before the handler runs and
//! writes them back afterwards, but only when a handler changed something.
//!
//! The OAuth handshake state never touches the store. It travels in its own
//! signed `oauth_state` cookie that expires after a few minutes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, warn};

use crate::error::{AppError, Result};
use crate::models::{Identity, Notification};
use crate::state::{current_timestamp, SessionData, SharedSessionStore};

pub const SESSION_COOKIE: &str = "sid";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
/// Only the login routes need to see the handshake cookie
const OAUTH_STATE_PATH: &str = "/auth/discord";
const OAUTH_STATE_TTL_SECS: u64 = 600;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies session IDs carried in the cookie
#[derive(Clone)]
pub struct CookieSigner {
    keyed: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Result<Self> {
        let keyed =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AppError::ConfigInvalid {
                key: "SESSION_SECRET".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Cookie value for a session ID
    pub fn sign(&self, id: &str) -> String {
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(mac.finalize().into_bytes());
        format!("{}.{}", id, signature)
    }

    /// Session ID from a cookie value, if the signature checks out
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id, signature) = value.rsplit_once('.')?;
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .ok()?;

        let mut mac = self.mac();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id.to_string())
    }
}

/// Everything the session middleware needs
#[derive(Clone)]
pub struct SessionManager {
    pub store: SharedSessionStore,
    pub signer: CookieSigner,
    pub ttl: Duration,
    /// Add `Secure` to the cookie (set when serving HTTPS)
    pub secure_cookie: bool,
}

impl SessionManager {
    pub fn new(store: SharedSessionStore, secret: &str, ttl: Duration) -> Result<Self> {
        Ok(Self {
            store,
            signer: CookieSigner::new(secret)?,
            ttl,
            secure_cookie: false,
        })
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        self.named_cookie(SESSION_COOKIE, "/", value, max_age)
    }

    fn state_cookie(&self, value: &str, max_age: u64) -> String {
        self.named_cookie(OAUTH_STATE_COOKIE, OAUTH_STATE_PATH, value, max_age)
    }

    fn named_cookie(&self, name: &str, path: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; HttpOnly; SameSite=Lax; Max-Age={}",
            name, value, path, max_age
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Resolve the request's session, starting a fresh one when the cookie is
    /// missing, forged, expired or the store cannot be read.
    async fn load(&self, headers: &HeaderMap) -> Session {
        let session = self.load_stored(headers).await;

        if let Some(raw) = get_cookie(headers, OAUTH_STATE_COOKIE) {
            let state = self.verify_oauth_state(&raw);
            if state.is_none() {
                debug!("Ignoring invalid or expired OAuth state cookie");
            }
            session.attach_oauth_state(state);
        }
        session
    }

    async fn load_stored(&self, headers: &HeaderMap) -> Session {
        let Some(id) = get_session_cookie(headers).and_then(|v| self.signer.verify(&v)) else {
            return Session::fresh(SessionData::new(self.ttl));
        };

        match self.store.load(&id).await {
            Ok(Some(data)) => Session::existing(id, data),
            Ok(None) => Session::fresh(SessionData::new(self.ttl)),
            Err(e) => {
                warn!("Failed to load session: {}", e);
                Session::fresh(SessionData::new(self.ttl))
            }
        }
    }

    /// Cookie value binding `state` to its expiry time
    fn sign_oauth_state(&self, state: &str, expires_at: u64) -> String {
        self.signer.sign(&format!("{}.{}", state, expires_at))
    }

    fn verify_oauth_state(&self, value: &str) -> Option<String> {
        let payload = self.signer.verify(value)?;
        let (state, expires_at) = payload.rsplit_once('.')?;
        let expires_at: u64 = expires_at.parse().ok()?;
        (current_timestamp() < expires_at).then(|| state.to_string())
    }

    /// Persist the session if it changed and attach the cookie to the response
    async fn commit(&self, session: &Session, response: &mut Response) {
        let (previous_id, outcome, state_cookie) = session.finish();

        let state_cookie = match state_cookie {
            StateCookie::Keep => None,
            StateCookie::Set(state) => {
                let expires_at = current_timestamp() + OAUTH_STATE_TTL_SECS;
                let value = self.sign_oauth_state(&state, expires_at);
                Some(self.state_cookie(&value, OAUTH_STATE_TTL_SECS))
            }
            StateCookie::Clear => Some(self.state_cookie("", 0)),
        };

        let set_cookie = match outcome {
            Outcome::Unchanged => None,
            Outcome::Destroyed => {
                if let Some(id) = previous_id {
                    if let Err(e) = self.store.remove(&id).await {
                        error!("Failed to remove session: {}", e);
                    }
                    Some(self.cookie("", 0))
                } else {
                    None
                }
            }
            Outcome::Save { data, rotate } => {
                let (id, is_new) = match previous_id {
                    Some(id) if !rotate => (id, false),
                    Some(old) => {
                        if let Err(e) = self.store.remove(&old).await {
                            warn!("Failed to remove rotated session: {}", e);
                        }
                        (uuid::Uuid::new_v4().to_string(), true)
                    }
                    None => (uuid::Uuid::new_v4().to_string(), true),
                };

                if let Err(e) = self.store.save(&id, &data).await {
                    error!("Failed to save session: {}", e);
                    None
                } else if is_new {
                    let max_age = data.expires_at.saturating_sub(data.created_at);
                    Some(self.cookie(&self.signer.sign(&id), max_age))
                } else {
                    None
                }
            }
        };

        for cookie in set_cookie.into_iter().chain(state_cookie) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => error!("Invalid session cookie header: {}", e),
            }
        }
    }
}

/// Extract the raw session cookie value from request headers
pub fn get_session_cookie(headers: &HeaderMap) -> Option<String> {
    get_cookie(headers, SESSION_COOKIE)
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|value| !value.is_empty())
}

enum Outcome {
    Unchanged,
    Save { data: SessionData, rotate: bool },
    Destroyed,
}

/// What to do with the `oauth_state` cookie on the way out
#[derive(Clone)]
enum StateCookie {
    Keep,
    Set(String),
    Clear,
}

struct SessionInner {
    id: Option<String>,
    data: SessionData,
    dirty: bool,
    rotate: bool,
    destroyed: bool,
    /// Verified state from the request's cookie
    oauth_state: Option<String>,
    state_cookie_sent: bool,
    state_cookie: StateCookie,
}

/// Handle to the current request's session
#[derive(Clone)]
pub struct Session {
    inner: Arc<parking_lot::Mutex<SessionInner>>,
}

impl Session {
    fn new(id: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(SessionInner {
                id,
                data,
                dirty: false,
                rotate: false,
                destroyed: false,
                oauth_state: None,
                state_cookie_sent: false,
                state_cookie: StateCookie::Keep,
            })),
        }
    }

    fn fresh(data: SessionData) -> Self {
        Self::new(None, data)
    }

    fn existing(id: String, data: SessionData) -> Self {
        Self::new(Some(id), data)
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.lock().data.identity.clone()
    }

    /// Store a freshly authenticated identity. The session ID is rotated on
    /// commit; pending notifications carry over.
    pub fn login(&self, identity: Identity) {
        let mut inner = self.inner.lock();
        inner.data.identity = Some(identity);
        inner.dirty = true;
        inner.rotate = true;
        inner.destroyed = false;
    }

    /// Forget the identity and drop the whole session
    pub fn logout(&self) {
        let mut inner = self.inner.lock();
        inner.data.identity = None;
        inner.data.notifications.clear();
        inner.destroyed = true;
    }

    pub fn push_notification(&self, notification: Notification) {
        let mut inner = self.inner.lock();
        inner.data.notifications.push(notification);
        inner.dirty = true;
    }

    /// Pending notifications, removing them from the session
    pub fn take_notifications(&self) -> Vec<Notification> {
        let mut inner = self.inner.lock();
        if inner.data.notifications.is_empty() {
            return Vec::new();
        }
        inner.dirty = true;
        std::mem::take(&mut inner.data.notifications)
    }

    fn attach_oauth_state(&self, state: Option<String>) {
        let mut inner = self.inner.lock();
        inner.oauth_state = state;
        inner.state_cookie_sent = true;
    }

    /// Start a handshake. The state goes out in its own short-lived cookie;
    /// the stored session is left untouched.
    pub fn set_oauth_state(&self, state: String) {
        self.inner.lock().state_cookie = StateCookie::Set(state);
    }

    /// The pending OAuth state, cleared so it can only be used once
    pub fn take_oauth_state(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        if inner.state_cookie_sent {
            inner.state_cookie = StateCookie::Clear;
        }
        inner.oauth_state.take()
    }

    fn finish(&self) -> (Option<String>, Outcome, StateCookie) {
        let inner = self.inner.lock();
        let outcome = if inner.destroyed {
            Outcome::Destroyed
        } else if inner.dirty {
            Outcome::Save {
                data: inner.data.clone(),
                rotate: inner.rotate,
            }
        } else {
            Outcome::Unchanged
        };
        (inner.id.clone(), outcome, inner.state_cookie.clone())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            error!("Session extractor used on a route without the session middleware");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Attach a [`Session`] to every request and persist it afterwards
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = manager.load(request.headers()).await;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    manager.commit(&session, &mut response).await;
    response
}
