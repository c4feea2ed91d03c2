//! Rocket endpoints around the engine: login redirect, the service callback
//! (ticket validation and single logout), the proxy callback, local logout
//! and a couple of JSON endpoints for the signed-in session.

mod identity;
mod login;
mod logout;
mod proxy_callback;
mod service;
mod session;

pub use session::{authenticate, issue_token, LiveSession, SessionClaims, SessionRegistry, WebConfig, SESSION_COOKIE};

use std::io::Cursor;
use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::distributions::{Alphanumeric, DistString};
use rocket::fairing::AdHoc;
use rocket::http::{CookieJar, Header, Status};
use rocket::response::{Responder, Response};
use rocket::{get, post, routes, Build, Rocket, State};
use tracing::{error, warn};

use crate::{CasClient, CasError, ErrorKind, ServerConfig, ServiceParameters};

pub struct CasState {
    pub client: Arc<CasClient>,
    pub sessions: Arc<SessionRegistry>,
    pub keys: (EncodingKey, DecodingKey),
    pub web: WebConfig,
}

impl CasState {
    pub fn new(client: CasClient, web: WebConfig) -> Self {
        let secret = if web.secret.is_empty() {
            warn!("cas_session.secret is not set; using a random key, sessions will not survive a restart");
            Alphanumeric.sample_string(&mut rand::thread_rng(), 64)
        } else {
            web.secret.clone()
        };
        if web.max_age() > client.config().session_ttl() {
            warn!(
                max_age = web.max_age,
                session_ttl_secs = client.config().session_ttl_secs,
                "sessions outlive the login ledger; CAS single logout will miss the oldest ones"
            );
        }
        Self {
            client: Arc::new(client),
            sessions: Arc::new(SessionRegistry::new(web.max_age())),
            keys: (EncodingKey::from_secret(secret.as_bytes()), DecodingKey::from_secret(secret.as_bytes())),
            web,
        }
    }
}

pub enum WebError {
    Cas(CasError),
    NotAuthenticated,
    InvalidToken(jsonwebtoken::errors::Error),
    Internal(String),
}

impl From<CasError> for WebError {
    fn from(err: CasError) -> Self {
        WebError::Cas(err)
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for WebError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, body) = match self {
            WebError::Cas(CasError::MissingCallbackParameter(_)) => {
                (Status::BadRequest, String::from("Missing necessary parameters"))
            }
            WebError::Cas(e @ CasError::InvalidLogoutRequest(_)) => (Status::BadRequest, e.to_string()),
            WebError::Cas(e @ CasError::InsufficientSession) => (Status::Forbidden, e.to_string()),
            WebError::Cas(e) => {
                let status = match e.kind() {
                    _ if e.is_rejection() => Status::Forbidden,
                    ErrorKind::Transport => Status::ServiceUnavailable,
                    ErrorKind::Protocol => Status::BadGateway,
                    _ => Status::InternalServerError,
                };
                (status, format!("CAS authentication failed: {e}"))
            }
            WebError::NotAuthenticated => (Status::Unauthorized, String::from("Not authenticated")),
            WebError::InvalidToken(e) => (Status::Forbidden, format!("Invalid token: {e}")),
            WebError::Internal(e) => {
                error!(error = %e, "request failed");
                (Status::InternalServerError, String::from("Internal error"))
            }
        };
        Ok(Response::build()
            .status(status)
            .header(Header::new("Content-Type", "text/plain"))
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

/// A 303 to `location`, optionally setting a cookie.
pub struct Redirect {
    location: String,
    set_cookie: Option<String>,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self { location: location.into(), set_cookie: None }
    }

    pub fn with_cookie(mut self, set_cookie: String) -> Self {
        self.set_cookie = Some(set_cookie);
        self
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Redirect {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let mut response = Response::build();
        response.status(Status::SeeOther).header(Header::new("Location", self.location));
        if let Some(cookie) = self.set_cookie {
            response.header(Header::new("Set-Cookie", cookie));
        }
        Ok(response.finalize())
    }
}

/// Reads the CAS settings from the `cas` and `cas_session` figment keys on
/// ignition.
pub fn rocket() -> Rocket<Build> {
    mount(rocket::build()).attach(AdHoc::try_on_ignite("CAS client", |rocket| async move {
        let config = match rocket.figment().extract_inner::<ServerConfig>("cas") {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "missing or invalid [cas] configuration");
                return Err(rocket);
            }
        };
        let web = rocket.figment().extract_inner::<WebConfig>("cas_session").unwrap_or_default();

        match CasClient::new(config) {
            Ok(client) => Ok(rocket.manage(CasState::new(client, web))),
            Err(e) => {
                error!(error = %e, "cannot start CAS client");
                Err(rocket)
            }
        }
    }))
}

/// Mounts the endpoints over an already-built client.
pub fn rocket_with(client: CasClient, web: WebConfig) -> Rocket<Build> {
    mount(rocket::build()).manage(CasState::new(client, web))
}

fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/",
        routes![
            login::login,
            service::service,
            service::single_logout,
            proxy_callback::proxy_callback,
            logout::logout,
            session::verify,
            identity::identity,
            identity::proxy,
        ],
    )
}

/// Keeps post-login redirects on this site. Browsers read `\` as `/`, so
/// any backslash is refused along with whitespace and control characters.
fn local_path(returnto: Option<&str>) -> String {
    let Some(path) = returnto.filter(|path| !path.is_empty()) else {
        return String::from("/");
    };
    if path.chars().any(|c| c == '\\' || c.is_control() || c.is_whitespace()) {
        return String::from("/");
    }

    let path = if path.starts_with('/') {
        path.to_owned()
    } else if path.contains(':') {
        return String::from("/");
    } else {
        format!("/{path}")
    };
    if path.starts_with("//") {
        return String::from("/");
    }
    path
}
