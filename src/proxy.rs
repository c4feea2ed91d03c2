//! Acting on a user's behalf toward other CAS-protected services.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rocket::http::Cookie;
use serde::Serialize;
use url::Url;

use crate::config::ServerConfig;
use crate::error::{CasError, Result};
use crate::pgt::ProxyGrantStore;
use crate::transport::{HttpTransport, TransportError};
use crate::urls;
use crate::xml;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Cookies a target service handed out after accepting our proxy ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySession {
    pub target_service: String,
    #[serde(skip)]
    pub session_key: String,
    pub cookies: Vec<ProxyCookie>,
}

impl ProxySession {
    pub fn cookie(&self, name: &str) -> Option<&ProxyCookie> {
        self.cookies.iter().find(|cookie| cookie.name == name)
    }

    /// Value for a `Cookie` request header toward the target service.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

type SessionKey = (String, String);

pub struct ProxyAuthenticator {
    transport: Arc<dyn HttpTransport>,
    sessions: RwLock<HashMap<SessionKey, ProxySession>>,
}

impl ProxyAuthenticator {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, sessions: RwLock::new(HashMap::new()) }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionKey, ProxySession>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionKey, ProxySession>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Authenticates to `target_service` for the caller identified by
    /// `session_key`, reusing the cookies of an earlier call when there are any.
    pub fn proxy_authenticate(
        &self,
        config: &ServerConfig,
        grants: &ProxyGrantStore,
        target_service: &str,
        session_key: &str,
    ) -> Result<ProxySession> {
        let key = (target_service.to_owned(), session_key.to_owned());
        if let Some(cached) = self.read().get(&key) {
            return Ok(cached.clone());
        }

        if !config.initializes_proxy() {
            return Err(CasError::InsufficientSession);
        }
        let pgt = grants.pgt_for_session(session_key).ok_or(CasError::InsufficientSession)?;

        let proxy_ticket = self.request_proxy_ticket(config, &pgt, target_service)?;
        let response = self
            .transport
            .get(&with_ticket(target_service, &proxy_ticket))
            .map_err(CasError::TargetUnreachable)?;
        match response.status {
            400..=499 => return Err(CasError::TargetRejected(response.status)),
            status if status >= 500 => return Err(CasError::TargetUnreachable(TransportError::Status(status))),
            _ => {}
        }

        let session = ProxySession {
            target_service: target_service.to_owned(),
            session_key: session_key.to_owned(),
            cookies: collect_cookies(&response.set_cookies, target_service),
        };
        self.write().insert(key, session.clone());
        Ok(session)
    }

    /// Trades the PGT for a one-time proxy ticket (`PT-…`) for `target_service`.
    pub fn request_proxy_ticket(&self, config: &ServerConfig, pgt: &str, target_service: &str) -> Result<String> {
        let url = urls::proxy_url(config, pgt, target_service)?;
        let response = self.transport.get(&url).map_err(CasError::CasUnreachable)?;
        match parse_proxy_response(&response.body) {
            Err(CasError::MalformedResponse(_)) if !response.is_success() => {
                Err(CasError::CasUnreachable(TransportError::Status(response.status)))
            }
            outcome => outcome,
        }
    }

    pub fn cached(&self, target_service: &str, session_key: &str) -> Option<ProxySession> {
        self.read().get(&(target_service.to_owned(), session_key.to_owned())).cloned()
    }

    /// Forgets every proxy session held for a caller session.
    pub fn invalidate_session(&self, session_key: &str) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|(_, key), _| key != session_key);
        before - sessions.len()
    }
}

/// `serviceResponse > proxySuccess > proxyTicket`.
pub fn parse_proxy_response(body: &str) -> Result<String> {
    let doc = xml::parse(body)?;
    let root = doc.root();

    if let Some(failure) = xml::find(root, "proxyFailure") {
        return Err(CasError::ProxyFailure {
            code: failure.attribute("code").unwrap_or_default().trim().to_owned(),
            message: xml::text_content(failure),
        });
    }
    let success = xml::find(root, "proxySuccess").ok_or_else(|| CasError::malformed("no proxySuccess element"))?;
    xml::child_text(success, "proxyTicket").ok_or(CasError::MalformedProxyTicket)
}

fn with_ticket(target_service: &str, proxy_ticket: &str) -> String {
    let sep = if target_service.contains('?') { "&" } else { "?" };
    format!("{target_service}{sep}ticket={}", urlencoding::encode(proxy_ticket))
}

/// Parses `Set-Cookie` values into an ordered set keyed by name and domain.
/// Cookies without a `Domain` attribute belong to the target's host.
fn collect_cookies(set_cookies: &[String], target_service: &str) -> Vec<ProxyCookie> {
    let host = Url::parse(target_service)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_default();

    let mut cookies: Vec<ProxyCookie> = Vec::new();
    for header in set_cookies {
        let Ok(cookie) = Cookie::parse(header.clone()) else {
            continue;
        };
        let parsed = ProxyCookie {
            name: cookie.name().to_owned(),
            value: cookie.value().to_owned(),
            domain: cookie.domain().map(str::to_owned).unwrap_or_else(|| host.clone()),
        };
        match cookies.iter_mut().find(|c| c.name == parsed.name && c.domain == parsed.domain) {
            Some(existing) => *existing = parsed,
            None => cookies.push(parsed),
        }
    }
    cookies
}
