//! Service ticket <-> session bookkeeping for single logout.
//!
//! Session ids are only kept as SHA-256 digests so nothing replayable sits in
//! the ledger. Records older than the session lifetime are dropped the next
//! time a login is recorded.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex SHA-256 digest of a session id.
pub fn session_digest(session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub session_digest: String,
    pub ticket: String,
    pub logged_in_at: DateTime<Utc>,
}

impl LoginRecord {
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.logged_in_at);
        age.to_std().map(|age| age >= ttl).unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct SessionTicketLedger {
    by_ticket: RwLock<HashMap<String, LoginRecord>>,
    ttl: Duration,
}

impl Default for SessionTicketLedger {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(8 * 3600))
    }
}

impl SessionTicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { by_ticket: RwLock::new(HashMap::new()), ttl }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, LoginRecord>> {
        self.by_ticket.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, LoginRecord>> {
        self.by_ticket.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called once per successful login.
    pub fn record(&self, session_id: &str, ticket: &str) -> LoginRecord {
        let record = LoginRecord {
            session_digest: session_digest(session_id),
            ticket: ticket.to_owned(),
            logged_in_at: Utc::now(),
        };
        self.write().insert(ticket.to_owned(), record.clone());
        debug!(session = %record.session_digest, "recorded login ticket");
        record
    }

    pub fn lookup(&self, ticket: &str) -> Option<LoginRecord> {
        self.read().get(ticket).cloned()
    }

    pub fn remove(&self, ticket: &str) -> Option<LoginRecord> {
        self.write().remove(ticket)
    }

    /// Drops every record of a session that ended locally. Returns how many.
    pub fn forget_session(&self, session_id: &str) -> usize {
        self.forget_digest(&session_digest(session_id))
    }

    pub fn forget_digest(&self, session_digest: &str) -> usize {
        let mut records = self.write();
        let before = records.len();
        records.retain(|_, record| record.session_digest != session_digest);
        before - records.len()
    }

    /// Drops records older than the session lifetime and returns the digests
    /// of the sessions they belonged to.
    pub fn purge_expired(&self) -> Vec<String> {
        let mut expired = Vec::new();
        self.write().retain(|_, record| {
            if record.is_expired(self.ttl) {
                expired.push(record.session_digest.clone());
                false
            } else {
                true
            }
        });
        expired.sort();
        expired.dedup();
        if !expired.is_empty() {
            debug!(count = expired.len(), "purged expired login records");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_digest_not_session_id() {
        let ledger = SessionTicketLedger::new();
        let record = ledger.record("raw-session-id", "ST-1");
        assert_ne!(record.session_digest, "raw-session-id");
        assert_eq!(record.session_digest.len(), 64);
        assert_eq!(record.session_digest, session_digest("raw-session-id"));
        assert_eq!(ledger.lookup("ST-1"), Some(record));
    }

    #[test]
    fn digest_is_stable_sha256() {
        assert_eq!(
            session_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn remove_by_ticket() {
        let ledger = SessionTicketLedger::new();
        ledger.record("s1", "ST-1");
        assert!(ledger.remove("ST-1").is_some());
        assert!(ledger.lookup("ST-1").is_none());
        assert!(ledger.remove("ST-1").is_none());
    }

    #[test]
    fn forget_session_drops_all_its_tickets() {
        let ledger = SessionTicketLedger::new();
        ledger.record("s1", "ST-1");
        ledger.record("s1", "ST-2");
        ledger.record("s2", "ST-3");
        assert_eq!(ledger.forget_session("s1"), 2);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.lookup("ST-3").is_some());
    }

    #[test]
    fn expired_records_are_purged_once_per_session() {
        let ledger = SessionTicketLedger::with_ttl(Duration::ZERO);
        ledger.record("s1", "ST-1");
        ledger.record("s1", "ST-2");
        assert_eq!(ledger.purge_expired(), [session_digest("s1")]);
        assert!(ledger.is_empty());
        assert!(ledger.purge_expired().is_empty());
    }

    #[test]
    fn fresh_records_survive_purge() {
        let ledger = SessionTicketLedger::new();
        ledger.record("s1", "ST-1");
        assert!(ledger.purge_expired().is_empty());
        assert_eq!(ledger.len(), 1);
    }
}
