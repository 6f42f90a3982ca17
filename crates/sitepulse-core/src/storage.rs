//! Client-held key/value state.
//!
//! Mirrors the two lifetimes a browser offers: a durable scope that outlives
//! the browsing session (visitor id, first-seen, consent) and a session scope
//! that dies with the tab (session id, activity timestamp, journey, landing
//! attribution).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Fixed key names for everything this crate keeps on the client.
pub mod keys {
    pub const CONSENT: &str = "sitepulse_consent";
    pub const VISITOR_ID: &str = "sitepulse_visitor_id";
    pub const VISITOR_FIRST_SEEN: &str = "sitepulse_visitor_first_seen";

    pub const SESSION_ID: &str = "sitepulse_session_id";
    pub const SESSION_LAST_ACTIVITY: &str = "sitepulse_session_last_activity";
    pub const SESSION_JOURNEY: &str = "sitepulse_session_journey";
    pub const LANDING_ATTRIBUTION: &str = "sitepulse_landing_attribution";

    /// Every identifier cleared when consent is revoked.
    pub const IDENTIFIERS: &[(super::StorageScope, &str)] = &[
        (super::StorageScope::Durable, VISITOR_ID),
        (super::StorageScope::Durable, VISITOR_FIRST_SEEN),
        (super::StorageScope::Session, SESSION_ID),
        (super::StorageScope::Session, SESSION_LAST_ACTIVITY),
        (super::StorageScope::Session, SESSION_JOURNEY),
        (super::StorageScope::Session, LANDING_ATTRIBUTION),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Survives across browsing sessions.
    Durable,
    /// Scoped to one tab's browsing session.
    Session,
}

pub trait ClientStorage: Send + Sync + 'static {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String>;
    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<()>;
    fn remove(&self, scope: StorageScope, key: &str) -> Result<()>;
}

/// Both scopes held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    durable: Mutex<HashMap<String, String>>,
    session: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything in the session scope, as closing the tab would.
    pub fn end_browser_session(&self) {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn scope(&self, scope: StorageScope) -> &Mutex<HashMap<String, String>> {
        match scope {
            StorageScope::Durable => &self.durable,
            StorageScope::Session => &self.session,
        }
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String> {
        self.scope(scope)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<()> {
        self.scope(scope)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: StorageScope, key: &str) -> Result<()> {
        self.scope(scope)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Durable scope persisted as a JSON object on disk; session scope in memory.
///
/// Every durable write rewrites the whole file. The file is small (a handful
/// of keys) so this stays cheap.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    durable: Mutex<BTreeMap<String, String>>,
    session: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, loading existing durable values if the file
    /// is present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let durable = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("reading client storage {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("parsing client storage {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            durable: Mutex::new(durable),
            session: Mutex::new(HashMap::new()),
        })
    }

    fn flush(&self, durable: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(durable)?;
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("writing client storage {}", self.path.display()))?;
        Ok(())
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String> {
        match scope {
            StorageScope::Durable => self
                .durable
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(key)
                .cloned(),
            StorageScope::Session => self
                .session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(key)
                .cloned(),
        }
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<()> {
        match scope {
            StorageScope::Durable => {
                let mut durable = self.durable.lock().unwrap_or_else(|e| e.into_inner());
                durable.insert(key.to_string(), value.to_string());
                self.flush(&durable)
            }
            StorageScope::Session => {
                self.session
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    fn remove(&self, scope: StorageScope, key: &str) -> Result<()> {
        match scope {
            StorageScope::Durable => {
                let mut durable = self.durable.lock().unwrap_or_else(|e| e.into_inner());
                if durable.remove(key).is_some() {
                    self.flush(&durable)?;
                }
                Ok(())
            }
            StorageScope::Session => {
                self.session
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(key);
                Ok(())
            }
        }
    }
}
