//! The engine wired together: login completion, proxying and logout.
//!
//! Session ids handed to [`CasClient`] are only ever kept as digests; the
//! digest is also the key for the session's PGT and its cached proxy
//! sessions.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::ledger::{session_digest, LoginRecord, SessionTicketLedger};
use crate::logout::{LogoutCoordinator, LogoutOutcome, SessionManager};
use crate::pgt::ProxyGrantStore;
use crate::proxy::{ProxyAuthenticator, ProxySession};
use crate::transport::{HttpTransport, IsahcTransport};
use crate::urls::{self, ServiceParameters};
use crate::validate::{CasIdentity, TicketValidator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub identity: CasIdentity,
    pub record: LoginRecord,
}

pub struct CasClient {
    config: Arc<ServerConfig>,
    validator: TicketValidator,
    grants: Arc<ProxyGrantStore>,
    ledger: Arc<SessionTicketLedger>,
    proxies: ProxyAuthenticator,
    logout: LogoutCoordinator,
}

impl CasClient {
    /// Talks to CAS over HTTPS.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let transport = Arc::new(IsahcTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Validates `config` and builds the engine over `transport`.
    pub fn with_transport(config: ServerConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;
        let grants = Arc::new(ProxyGrantStore::new(config.proxy.pgt_wait(), config.proxy.pgt_ttl()));
        let ledger = Arc::new(SessionTicketLedger::with_ttl(config.session_ttl()));
        Ok(Self {
            validator: TicketValidator::new(Arc::clone(&transport)),
            proxies: ProxyAuthenticator::new(transport),
            logout: LogoutCoordinator::new(Arc::clone(&ledger)),
            config: Arc::new(config),
            grants,
            ledger,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn grants(&self) -> &ProxyGrantStore {
        &self.grants
    }

    pub fn ledger(&self) -> &SessionTicketLedger {
        &self.ledger
    }

    pub fn login_url(&self, params: &ServiceParameters, gateway: bool) -> Result<String> {
        urls::login_url(&self.config, params, gateway)
    }

    pub fn logout_url(&self) -> Result<String> {
        urls::logout_url(&self.config, self.config.logout_destination.as_deref())
    }

    /// Validates `ticket`, claims the PGT when proxying, and records the
    /// ticket against `session_id` for single logout. Nothing is recorded
    /// when any step fails. Sessions older than `session_ttl_secs` are
    /// released on the way.
    pub fn complete_login(&self, ticket: &str, params: &ServiceParameters, session_id: &str) -> Result<Login> {
        let identity = self.validator.validate(&self.config, ticket, params)?;
        for expired in self.ledger.purge_expired() {
            self.release_session(&expired);
        }
        let digest = session_digest(session_id);

        if let Some(pgt_iou) = identity.pgt_iou.as_deref() {
            let pgt = self.grants.resolve(pgt_iou)?;
            self.grants.bind_session(&digest, pgt);
        }

        let record = self.ledger.record(session_id, ticket);
        Ok(Login { identity, record })
    }

    /// Entry point for the proxy callback endpoint.
    pub fn record_proxy_callback(&self, pgt_iou: Option<&str>, pgt_id: Option<&str>) -> Result<()> {
        self.grants.record_callback(pgt_iou, pgt_id)
    }

    pub fn proxy_authenticate(&self, target_service: &str, session_id: &str) -> Result<ProxySession> {
        self.proxies
            .proxy_authenticate(&self.config, &self.grants, target_service, &session_digest(session_id))
    }

    /// Handles a logout notification from CAS and drops the session's proxy
    /// state along with it.
    pub fn handle_logout(&self, logout_request: &str, sessions: &dyn SessionManager) -> Result<LogoutOutcome> {
        let outcome = self.logout.handle_logout(logout_request, sessions)?;
        if let LogoutOutcome::SessionDestroyed { session_digest, .. } = &outcome {
            self.release_session(session_digest);
        }
        Ok(outcome)
    }

    /// Local logout: forgets everything held for `session_id`.
    pub fn end_session(&self, session_id: &str) {
        self.release_session(&session_digest(session_id));
    }

    /// Same as [`CasClient::end_session`] for a session known only by digest.
    pub fn release_session(&self, session_digest: &str) {
        self.ledger.forget_digest(session_digest);
        self.grants.release_session(session_digest);
        self.proxies.invalidate_session(session_digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::error::CasError;

    #[test]
    fn new_rejects_incomplete_config() {
        let err = CasClient::new(ServerConfig::new("", "https://app.example.com/casservice")).err();
        assert!(matches!(err, Some(CasError::Configuration(_))));

        let proxy_without_callback = ServerConfig::new("cas.example.com", "https://app.example.com/casservice")
            .with_proxy(ProxyConfig { initialize: true, ..ProxyConfig::default() });
        assert!(matches!(CasClient::new(proxy_without_callback).err(), Some(CasError::Configuration(_))));
    }
}
