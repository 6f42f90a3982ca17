//! Per-tab browsing session with a sliding idle timeout.
//!
//! ```text
//!   Absent --get_session--> Active (new id, is_new_session = true)
//!   Active --get_session within 30 min--> Active (same id, timestamp refreshed)
//!   Active --idle > 30 min--> Absent  (next get_session mints a fresh id)
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::storage::{keys, ClientStorage, StorageScope};
use crate::visitor::{mint_client_id, parse_timestamp};

pub const SESSION_IDLE_TIMEOUT_MINUTES: i64 = 30;

pub fn session_idle_timeout() -> Duration {
    Duration::minutes(SESSION_IDLE_TIMEOUT_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub is_new_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyEntry {
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn ClientStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Resolve the current session, starting a new one if none is active.
    ///
    /// Starting a session also resets the journey and the landing attribution
    /// snapshot so nothing from an expired session leaks into the new one.
    pub fn get_session(&self) -> Result<SessionHandle> {
        let now = self.clock.now();

        if let Some(session_id) = self.active_session_id(now) {
            self.storage.set(
                StorageScope::Session,
                keys::SESSION_LAST_ACTIVITY,
                &now.to_rfc3339(),
            )?;
            return Ok(SessionHandle {
                session_id,
                is_new_session: false,
            });
        }

        let session_id = mint_client_id("s", now);
        self.storage
            .remove(StorageScope::Session, keys::SESSION_JOURNEY)?;
        self.storage
            .remove(StorageScope::Session, keys::LANDING_ATTRIBUTION)?;
        self.storage
            .set(StorageScope::Session, keys::SESSION_ID, &session_id)?;
        self.storage.set(
            StorageScope::Session,
            keys::SESSION_LAST_ACTIVITY,
            &now.to_rfc3339(),
        )?;
        debug!(session_id = %session_id, "Started new session");

        Ok(SessionHandle {
            session_id,
            is_new_session: true,
        })
    }

    /// The stored session id, if one exists and has not idled out.
    pub fn current_session_id(&self) -> Option<String> {
        self.active_session_id(self.clock.now())
    }

    fn active_session_id(&self, now: DateTime<Utc>) -> Option<String> {
        let session_id = self.storage.get(StorageScope::Session, keys::SESSION_ID)?;
        let last_activity = self
            .storage
            .get(StorageScope::Session, keys::SESSION_LAST_ACTIVITY)
            .as_deref()
            .and_then(parse_timestamp)?;

        if now - last_activity > session_idle_timeout() {
            None
        } else {
            Some(session_id)
        }
    }

    pub fn journey(&self) -> Vec<JourneyEntry> {
        let Some(raw) = self.storage.get(StorageScope::Session, keys::SESSION_JOURNEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session journey");
                Vec::new()
            }
        }
    }

    /// Append `path` to this session's journey.
    pub fn add_to_journey(&self, path: &str) -> Result<()> {
        let mut entries = self.journey();
        entries.push(JourneyEntry {
            path: path.to_string(),
            timestamp: self.clock.now(),
        });
        let raw = serde_json::to_string(&entries)?;
        self.storage
            .set(StorageScope::Session, keys::SESSION_JOURNEY, &raw)
    }

    /// Path of the most recently appended journey entry.
    ///
    /// Call before appending the current page, otherwise this returns the
    /// current page itself.
    pub fn get_previous_path(&self) -> Option<String> {
        self.journey().pop().map(|entry| entry.path)
    }
}
