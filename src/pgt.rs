//! Proxy-granting ticket hand-off.
//!
//! CAS delivers a PGTIOU/PGT pair to the proxy callback endpoint while it is
//! answering our validation request, so the mapping can land slightly before
//! or after the validation response that names the PGTIOU. [`ProxyGrantStore::resolve`]
//! waits a bounded time for the callback before giving up.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{CasError, Result};

/// A PGTIOU -> PGT pair as reported by the CAS server. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgtMapping {
    pub pgt_iou: String,
    pub pgt: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Grants {
    by_iou: HashMap<String, PgtMapping>,
    by_session: HashMap<String, String>,
}

#[derive(Debug)]
pub struct ProxyGrantStore {
    grants: Mutex<Grants>,
    arrived: Condvar,
    wait: Duration,
    ttl: Duration,
}

impl ProxyGrantStore {
    pub fn new(wait: Duration, ttl: Duration) -> Self {
        Self { grants: Mutex::new(Grants::default()), arrived: Condvar::new(), wait, ttl }
    }

    fn lock(&self) -> MutexGuard<'_, Grants> {
        self.grants.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a pair pushed by the CAS server. Either value missing or blank is
    /// rejected so the endpoint can answer CAS with an error status.
    pub fn record_callback(&self, pgt_iou: Option<&str>, pgt: Option<&str>) -> Result<()> {
        let pgt_iou = pgt_iou
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(CasError::MissingCallbackParameter("pgtIou"))?;
        let pgt = pgt
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(CasError::MissingCallbackParameter("pgtId"))?;

        let mut grants = self.lock();
        purge(&mut grants, self.ttl);
        if grants.by_iou.contains_key(pgt_iou) {
            warn!(pgt_iou, "duplicate proxy callback ignored");
            return Ok(());
        }
        grants.by_iou.insert(
            pgt_iou.to_owned(),
            PgtMapping { pgt_iou: pgt_iou.to_owned(), pgt: pgt.to_owned(), received_at: Utc::now() },
        );
        drop(grants);

        debug!(pgt_iou, "stored proxy-granting ticket");
        self.arrived.notify_all();
        Ok(())
    }

    /// Takes the PGT promised by `pgt_iou`, waiting up to the configured window
    /// for the callback. A miss means the callback endpoint is misconfigured or
    /// unreachable; it is not retried.
    pub fn resolve(&self, pgt_iou: &str) -> Result<String> {
        let deadline = Instant::now() + self.wait;
        let mut grants = self.lock();
        loop {
            if let Some(mapping) = grants.by_iou.remove(pgt_iou) {
                if !is_expired(&mapping, self.ttl) {
                    return Ok(mapping.pgt);
                }
                warn!(pgt_iou, "proxy-granting ticket expired before it was claimed");
                return Err(CasError::PgtNotResolved(pgt_iou.to_owned()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CasError::PgtNotResolved(pgt_iou.to_owned()));
            }
            grants = self
                .arrived
                .wait_timeout(grants, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Remembers which PGT belongs to a caller session.
    pub fn bind_session(&self, session_key: &str, pgt: impl Into<String>) {
        self.lock().by_session.insert(session_key.to_owned(), pgt.into());
    }

    pub fn pgt_for_session(&self, session_key: &str) -> Option<String> {
        self.lock().by_session.get(session_key).cloned()
    }

    pub fn release_session(&self, session_key: &str) -> Option<String> {
        self.lock().by_session.remove(session_key)
    }

    /// Drops unclaimed mappings older than the TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        purge(&mut self.lock(), self.ttl)
    }

    pub fn pending(&self) -> usize {
        self.lock().by_iou.len()
    }
}

fn is_expired(mapping: &PgtMapping, ttl: Duration) -> bool {
    let age = Utc::now().signed_duration_since(mapping.received_at);
    age.to_std().map(|age| age > ttl).unwrap_or(false)
}

fn purge(grants: &mut Grants, ttl: Duration) -> usize {
    let before = grants.by_iou.len();
    grants.by_iou.retain(|_, mapping| !is_expired(mapping, ttl));
    before - grants.by_iou.len()
}
