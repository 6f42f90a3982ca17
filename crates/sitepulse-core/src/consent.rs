//! Binary analytics consent.
//!
//! Nothing in the tracking path mints an identifier, writes client state, or
//! talks to the store unless [`ConsentGate::has_consent`] returns `true`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::storage::{keys, ClientStorage, StorageScope};

const GRANTED: &str = "granted";
const DENIED: &str = "denied";

/// The check every write path consults before doing anything.
pub trait ConsentGate: Send + Sync + 'static {
    fn has_consent(&self) -> bool;
}

/// Gate for server-side ingestion: browsers only post page views after they
/// have passed their own [`ConsentStore`] check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsentEnforcedUpstream;

impl ConsentGate for ConsentEnforcedUpstream {
    fn has_consent(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Granted,
    Denied,
}

#[derive(Clone)]
pub struct ConsentStore {
    storage: Arc<dyn ClientStorage>,
}

impl ConsentStore {
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    pub fn decision(&self) -> Option<ConsentDecision> {
        match self
            .storage
            .get(StorageScope::Durable, keys::CONSENT)
            .as_deref()
        {
            Some(GRANTED) => Some(ConsentDecision::Granted),
            Some(DENIED) => Some(ConsentDecision::Denied),
            _ => None,
        }
    }

    pub fn has_consent(&self) -> bool {
        self.decision() == Some(ConsentDecision::Granted)
    }

    /// `true` once the visitor has answered either way.
    pub fn has_decision(&self) -> bool {
        self.decision().is_some()
    }

    pub fn grant(&self) -> Result<()> {
        self.storage
            .set(StorageScope::Durable, keys::CONSENT, GRANTED)?;
        info!("Analytics consent granted");
        Ok(())
    }

    /// Record a denial, then wipe every client-held identifier.
    ///
    /// The denial is written first: if clearing fails part way the gate is
    /// already closed. Server-side rows are left untouched.
    pub fn revoke(&self) -> Result<()> {
        self.storage
            .set(StorageScope::Durable, keys::CONSENT, DENIED)?;

        let mut failures = 0usize;
        for (scope, key) in keys::IDENTIFIERS {
            if let Err(e) = self.storage.remove(*scope, key) {
                warn!(key, error = %e, "Failed to clear client identifier after consent revocation");
                failures += 1;
            }
        }
        info!(failures, "Analytics consent revoked");

        if failures > 0 {
            anyhow::bail!("consent revoked but {failures} identifier(s) could not be cleared");
        }
        Ok(())
    }
}

impl ConsentGate for ConsentStore {
    fn has_consent(&self) -> bool {
        ConsentStore::has_consent(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    /// Storage whose removals always fail.
    struct StickyStorage(MemoryStorage);

    impl ClientStorage for StickyStorage {
        fn get(&self, scope: StorageScope, key: &str) -> Option<String> {
            self.0.get(scope, key)
        }
        fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<()> {
            self.0.set(scope, key, value)
        }
        fn remove(&self, _scope: StorageScope, _key: &str) -> Result<()> {
            anyhow::bail!("storage is read-only")
        }
    }

    #[test]
    fn absent_decision_means_no_consent() {
        let consent = ConsentStore::new(Arc::new(MemoryStorage::new()));
        assert!(!consent.has_decision());
        assert!(!consent.has_consent());
    }

    #[test]
    fn grant_then_revoke() {
        let storage = Arc::new(MemoryStorage::new());
        let consent = ConsentStore::new(storage.clone());

        consent.grant().unwrap();
        assert!(consent.has_consent());
        assert!(consent.has_decision());

        storage
            .set(StorageScope::Durable, keys::VISITOR_ID, "v_1")
            .unwrap();
        storage
            .set(StorageScope::Session, keys::SESSION_ID, "s_1")
            .unwrap();
        storage
            .set(StorageScope::Session, keys::SESSION_JOURNEY, "[]")
            .unwrap();

        consent.revoke().unwrap();
        assert!(!consent.has_consent());
        assert!(consent.has_decision());
        assert_eq!(consent.decision(), Some(ConsentDecision::Denied));
        assert_eq!(storage.get(StorageScope::Durable, keys::VISITOR_ID), None);
        assert_eq!(storage.get(StorageScope::Session, keys::SESSION_ID), None);
        assert_eq!(storage.get(StorageScope::Session, keys::SESSION_JOURNEY), None);
    }

    #[test]
    fn revoke_records_denial_even_when_clearing_fails() {
        let storage = Arc::new(StickyStorage(MemoryStorage::new()));
        let consent = ConsentStore::new(storage);
        consent.grant().unwrap();

        assert!(consent.revoke().is_err());
        assert_eq!(consent.decision(), Some(ConsentDecision::Denied));
        assert!(!consent.has_consent());
    }
}
