use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::*;
use crate::{session_digest, CasIdentity, SessionManager};

pub const SESSION_COOKIE: &str = "cas_session";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HS256 key for the session cookie. A random one is drawn when empty.
    pub secret: String,
    /// Session lifetime, in seconds.
    pub max_age: u64,
    /// Parent domain the cookie is shared with, without the leading dot.
    pub cookie_domain: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { secret: String::new(), max_age: 8 * 3600, cookie_domain: None }
    }
}

impl WebConfig {
    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(token, self.max_age)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }

    pub fn removal_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={max_age}");
        if let Some(domain) = &self.cookie_domain {
            cookie.push_str("; Domain=.");
            cookie.push_str(domain);
        }
        cookie
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub exp: usize,
    pub iat: usize,
    pub sub: String,
    /// Session id; the registry and the engine only see its digest.
    pub sid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveSession {
    pub identity: CasIdentity,
    pub started_at: DateTime<Utc>,
}

impl LiveSession {
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.started_at);
        age.to_std().map(|age| age >= ttl).unwrap_or(false)
    }
}

/// Signed-in sessions of this node, keyed by session digest so that CAS
/// single logout can reach them. Sessions live as long as their cookie.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, LiveSession>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    pub fn new_session_id() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), 32)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, LiveSession>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, LiveSession>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a session and evicts the ones that outlived the cookie.
    /// Returns the digests of the evicted sessions so their engine state can
    /// be released.
    pub fn open(&self, session_id: &str, identity: CasIdentity) -> Vec<String> {
        let mut sessions = self.write();
        let mut expired = Vec::new();
        sessions.retain(|digest, session| {
            if session.is_expired(self.ttl) {
                expired.push(digest.clone());
                false
            } else {
                true
            }
        });
        sessions.insert(session_digest(session_id), LiveSession { identity, started_at: Utc::now() });
        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted expired sessions");
        }
        expired
    }

    pub fn get(&self, session_id: &str) -> Option<LiveSession> {
        self.read()
            .get(&session_digest(session_id))
            .filter(|session| !session.is_expired(self.ttl))
            .cloned()
    }

    pub fn close(&self, session_id: &str) -> Option<LiveSession> {
        self.write().remove(&session_digest(session_id))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl SessionManager for SessionRegistry {
    fn destroy(&self, session_digest: &str) {
        if self.write().remove(session_digest).is_none() {
            debug!(session = %session_digest, "session was already gone");
        }
    }
}

pub fn issue_token(state: &CasState, session_id: &str, username: &str) -> Result<String, WebError> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = SessionClaims {
        iat: now,
        exp: now + state.web.max_age as usize,
        sub: username.to_owned(),
        sid: session_id.to_owned(),
    };
    jsonwebtoken::encode(&jsonwebtoken::Header::new(Algorithm::HS256), &claims, &state.keys.0)
        .map_err(|e| WebError::Internal(format!("cannot sign session token: {e}")))
}

/// Resolves the session cookie to a live session. A well-signed token whose
/// session was ended (locally or by CAS) is not authenticated.
pub fn authenticate(state: &CasState, cookies: &CookieJar<'_>) -> Result<(SessionClaims, LiveSession), WebError> {
    let token_cookie = cookies.get(SESSION_COOKIE).ok_or(WebError::NotAuthenticated)?;
    let data = jsonwebtoken::decode::<SessionClaims>(token_cookie.value(), &state.keys.1, &Validation::new(Algorithm::HS256))
        .map_err(WebError::InvalidToken)?;
    let session = state.sessions.get(&data.claims.sid).ok_or(WebError::NotAuthenticated)?;
    Ok((data.claims, session))
}

pub struct SuccessfulVerification(LiveSession);

impl<'r, 'o: 'r> Responder<'r, 'o> for SuccessfulVerification {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let identity = self.0.identity;
        let mut response = Response::build();
        response.status(Status::Ok).header(Header::new("X-Cas-User", identity.username));
        for (name, values) in identity.attributes {
            response.header(Header::new(format!("X-Cas-Attribute-{name}"), values.join(",")));
        }
        Ok(response.finalize())
    }
}

/// Forward-auth endpoint for a reverse proxy.
#[get("/verify")]
pub fn verify(state: &State<CasState>, cookies: &CookieJar<'_>) -> Result<SuccessfulVerification, WebError> {
    let (_, session) = authenticate(state, cookies)?;
    Ok(SuccessfulVerification(session))
}
