//! CAS single logout.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CasError, Result};
use crate::ledger::SessionTicketLedger;
use crate::xml;

/// The host application's session store, addressed by session digest
/// (see [`crate::ledger::session_digest`]).
pub trait SessionManager: Send + Sync {
    fn destroy(&self, session_digest: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The ticket belonged to a session on this node; it has been destroyed.
    SessionDestroyed { ticket: String, session_digest: String },
    /// CAS notified us about a session this node never saw.
    UnknownTicket { ticket: String },
}

/// Pulls the service ticket out of the `SessionIndex` of a SAML
/// `LogoutRequest`.
pub fn session_index(logout_request: &str) -> Result<String> {
    let doc = xml::parse(logout_request).map_err(|e| CasError::InvalidLogoutRequest(e.to_string()))?;
    let index = xml::find(doc.root(), "SessionIndex")
        .ok_or_else(|| CasError::InvalidLogoutRequest("no SessionIndex element".into()))?;
    let ticket = xml::text_content(index);
    if ticket.is_empty() {
        return Err(CasError::InvalidLogoutRequest("empty SessionIndex".into()));
    }
    Ok(ticket)
}

pub struct LogoutCoordinator {
    ledger: Arc<SessionTicketLedger>,
}

impl LogoutCoordinator {
    pub fn new(ledger: Arc<SessionTicketLedger>) -> Self {
        Self { ledger }
    }

    /// Handles a logout notification pushed by CAS. An unknown ticket is not
    /// an error; malformed XML is.
    pub fn handle_logout(&self, logout_request: &str, sessions: &dyn SessionManager) -> Result<LogoutOutcome> {
        let ticket = session_index(logout_request)?;
        let Some(record) = self.ledger.lookup(&ticket) else {
            debug!(%ticket, "logout request for unknown ticket");
            return Ok(LogoutOutcome::UnknownTicket { ticket });
        };

        sessions.destroy(&record.session_digest);
        self.ledger.remove(&ticket);
        info!(%ticket, session = %record.session_digest, "session ended by CAS single logout");
        Ok(LogoutOutcome::SessionDestroyed { ticket, session_digest: record.session_digest })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ErrorKind;
    use crate::ledger::session_digest;

    #[derive(Default)]
    struct RecordingSessions(Mutex<Vec<String>>);

    impl SessionManager for RecordingSessions {
        fn destroy(&self, session_digest: &str) {
            self.0.lock().unwrap().push(session_digest.to_owned());
        }
    }

    fn logout_request(ticket: &str) -> String {
        format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
                   xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
                   ID="LR-1" Version="2.0" IssueInstant="2026-10-16T10:00:00Z">
                 <saml:NameID>@NOT_USED@</saml:NameID>
                 <samlp:SessionIndex>{ticket}</samlp:SessionIndex>
               </samlp:LogoutRequest>"#
        )
    }

    #[test]
    fn extracts_session_index() {
        assert_eq!(session_index(&logout_request("ST-123")).unwrap(), "ST-123");
    }

    #[test]
    fn known_ticket_destroys_session() {
        let ledger = Arc::new(SessionTicketLedger::new());
        ledger.record("session-1", "ST-123");
        let sessions = RecordingSessions::default();

        let outcome = LogoutCoordinator::new(ledger.clone())
            .handle_logout(&logout_request("ST-123"), &sessions)
            .unwrap();

        assert_eq!(
            outcome,
            LogoutOutcome::SessionDestroyed { ticket: "ST-123".into(), session_digest: session_digest("session-1") }
        );
        assert_eq!(*sessions.0.lock().unwrap(), [session_digest("session-1")]);
        assert!(ledger.lookup("ST-123").is_none());
    }

    #[test]
    fn unknown_ticket_is_a_no_op() {
        let ledger = Arc::new(SessionTicketLedger::new());
        let sessions = RecordingSessions::default();
        let outcome = LogoutCoordinator::new(ledger).handle_logout(&logout_request("ST-999"), &sessions).unwrap();
        assert_eq!(outcome, LogoutOutcome::UnknownTicket { ticket: "ST-999".into() });
        assert!(sessions.0.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_request_is_protocol_error() {
        let ledger = Arc::new(SessionTicketLedger::new());
        let coordinator = LogoutCoordinator::new(ledger);
        let sessions = RecordingSessions::default();
        for body in ["<samlp:LogoutRequest", "<LogoutRequest/>", "<LogoutRequest><SessionIndex> </SessionIndex></LogoutRequest>"] {
            let err = coordinator.handle_logout(body, &sessions).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol, "{body}");
        }
    }
}
