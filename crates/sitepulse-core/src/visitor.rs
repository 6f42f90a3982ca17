use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::clock::Clock;
use crate::session::SESSION_IDLE_TIMEOUT_MINUTES;
use crate::storage::{keys, ClientStorage, StorageScope};

/// Generate a client-side identifier: `{prefix}_{unix_millis}_{16 hex chars}`.
///
/// Uniqueness comes from the timestamp plus 8 random bytes; the value is
/// pseudonymous, not secret.
pub(crate) fn mint_client_id(prefix: &str, now: DateTime<Utc>) -> String {
    let mut buf = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut buf);
    format!("{}_{}_{}", prefix, now.timestamp_millis(), hex::encode(buf))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Long-lived pseudonymous visitor identity kept in durable client storage.
#[derive(Clone)]
pub struct VisitorIdentity {
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
}

impl VisitorIdentity {
    pub fn new(storage: Arc<dyn ClientStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Return the stored visitor id, minting and persisting one on first use.
    pub fn get_or_create_visitor_id(&self) -> Result<String> {
        if let Some(existing) = self.storage.get(StorageScope::Durable, keys::VISITOR_ID) {
            return Ok(existing);
        }

        let now = self.clock.now();
        let visitor_id = mint_client_id("v", now);
        self.storage
            .set(StorageScope::Durable, keys::VISITOR_ID, &visitor_id)?;
        self.storage.set(
            StorageScope::Durable,
            keys::VISITOR_FIRST_SEEN,
            &now.to_rfc3339(),
        )?;
        tracing::debug!(visitor_id = %visitor_id, "Minted visitor id");
        Ok(visitor_id)
    }

    pub fn visitor_id(&self) -> Option<String> {
        self.storage.get(StorageScope::Durable, keys::VISITOR_ID)
    }

    pub fn first_seen_at(&self) -> Option<DateTime<Utc>> {
        self.storage
            .get(StorageScope::Durable, keys::VISITOR_FIRST_SEEN)
            .as_deref()
            .and_then(parse_timestamp)
    }

    /// Whether this browser was first seen within the session idle window.
    ///
    /// A UX hint only. Whether a visitor counts as "new" in reports is decided
    /// server-side against the requested date range.
    pub fn is_recent_first_visit(&self) -> bool {
        match self.first_seen_at() {
            Some(first_seen) => {
                self.clock.now() - first_seen
                    <= chrono::Duration::minutes(SESSION_IDLE_TIMEOUT_MINUTES)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use chrono::{Duration, TimeZone};

    fn setup() -> (VisitorIdentity, ManualClock, Arc<MemoryStorage>) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let identity = VisitorIdentity::new(storage.clone(), Arc::new(clock.clone()));
        (identity, clock, storage)
    }

    #[test]
    fn minted_id_has_prefix_timestamp_and_suffix() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let id = mint_client_id("v", now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "v");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 16);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn visitor_id_is_stable_once_minted() {
        let (identity, clock, _) = setup();
        let first = identity.get_or_create_visitor_id().unwrap();
        clock.advance(Duration::days(40));
        let second = identity.get_or_create_visitor_id().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn first_seen_is_recorded_with_the_id() {
        let (identity, clock, _) = setup();
        assert_eq!(identity.first_seen_at(), None);
        identity.get_or_create_visitor_id().unwrap();
        assert_eq!(identity.first_seen_at(), Some(clock.now()));
    }

    #[test]
    fn recent_first_visit_expires_with_idle_window() {
        let (identity, clock, _) = setup();
        assert!(!identity.is_recent_first_visit());

        identity.get_or_create_visitor_id().unwrap();
        assert!(identity.is_recent_first_visit());

        clock.advance(Duration::minutes(30));
        assert!(identity.is_recent_first_visit());

        clock.advance(Duration::seconds(1));
        assert!(!identity.is_recent_first_visit());
    }

    #[test]
    fn distinct_browsers_get_distinct_ids() {
        let (a, _, _) = setup();
        let (b, _, _) = setup();
        assert_ne!(
            a.get_or_create_visitor_id().unwrap(),
            b.get_or_create_visitor_id().unwrap()
        );
    }
}
