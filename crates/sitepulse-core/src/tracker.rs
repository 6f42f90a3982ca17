//! Per-process tracking service: ties consent, identity, session and
//! attribution state to the recorder.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::attribution::AttributionCapture;
use crate::clock::Clock;
use crate::consent::ConsentStore;
use crate::device::{detect_browser, detect_device_type, detect_os, screen_resolution};
use crate::event::{NavigationContext, TrackingContext};
use crate::recorder::EventRecorder;
use crate::session::SessionManager;
use crate::storage::ClientStorage;
use crate::store::SiteStore;
use crate::visitor::VisitorIdentity;

#[derive(Clone)]
pub struct Tracker {
    consent: ConsentStore,
    visitor: VisitorIdentity,
    sessions: SessionManager,
    attribution: AttributionCapture,
    recorder: EventRecorder,
}

impl Tracker {
    pub fn new(
        storage: Arc<dyn ClientStorage>,
        clock: Arc<dyn Clock>,
        recorder: EventRecorder,
    ) -> Self {
        Self {
            consent: ConsentStore::new(storage.clone()),
            visitor: VisitorIdentity::new(storage.clone(), clock.clone()),
            sessions: SessionManager::new(storage.clone(), clock.clone()),
            attribution: AttributionCapture::new(storage, clock),
            recorder,
        }
    }

    /// Tracker whose recorder is gated by the same client-side consent.
    pub fn with_store(
        storage: Arc<dyn ClientStorage>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SiteStore>,
    ) -> Self {
        let gate = Arc::new(ConsentStore::new(storage.clone()));
        let recorder = EventRecorder::new(store, gate, clock.clone());
        Self::new(storage, clock, recorder)
    }

    pub fn consent(&self) -> &ConsentStore {
        &self.consent
    }

    pub fn visitor(&self) -> &VisitorIdentity {
        &self.visitor
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn attribution(&self) -> &AttributionCapture {
        &self.attribution
    }

    pub fn grant_consent(&self) -> Result<()> {
        self.consent.grant()
    }

    pub fn revoke_consent(&self) -> Result<()> {
        self.consent.revoke()
    }

    /// Handle one navigation. Returns the recording task, or `None` when
    /// nothing was tracked.
    pub fn track_page_view(
        &self,
        nav: &NavigationContext,
        user_id: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        if !self.consent.has_consent() {
            debug!("Analytics consent not granted; navigation not tracked");
            return None;
        }

        let visitor_cookie_id = match self.visitor.get_or_create_visitor_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not resolve visitor id; navigation not tracked");
                return None;
            }
        };
        let session = match self.sessions.get_session() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not resolve session; navigation not tracked");
                return None;
            }
        };

        if session.is_new_session {
            if let Err(e) = self.attribution.persist_landing_attribution(nav) {
                warn!(error = %e, "Failed to persist landing attribution");
            }
        }
        let attribution = self.attribution.get_landing_attribution(nav);

        let page_path = nav.page_path();
        let previous_page_path = self.sessions.get_previous_path();
        if let Err(e) = self.sessions.add_to_journey(&page_path) {
            warn!(error = %e, "Failed to append to session journey");
        }

        let user_agent = nav.user_agent.as_deref().filter(|ua| !ua.trim().is_empty());
        let ctx = TrackingContext {
            visitor_cookie_id,
            session_cookie_id: session.session_id,
            user_id: user_id.map(str::to_string),
            page_path,
            page_url: nav.url.clone(),
            page_title: nav.title.clone(),
            previous_page_path,
            referrer: attribution.referrer,
            utm_source: attribution.utm.utm_source,
            utm_medium: attribution.utm.utm_medium,
            utm_campaign: attribution.utm.utm_campaign,
            utm_term: attribution.utm.utm_term,
            utm_content: attribution.utm.utm_content,
            device_type: user_agent.map(|ua| detect_device_type(ua).as_str().to_string()),
            browser: user_agent.map(|ua| detect_browser(ua).to_string()),
            os: user_agent.map(|ua| detect_os(ua).to_string()),
            screen_resolution: match (nav.screen_width, nav.screen_height) {
                (Some(w), Some(h)) => Some(screen_resolution(w, h)),
                _ => None,
            },
            is_new_session: session.is_new_session,
        };
        Some(self.recorder.record_page_view(ctx))
    }

    /// Attach an authenticated user to the current visitor's history.
    pub fn identify(&self, user_id: &str) -> Option<JoinHandle<()>> {
        if !self.consent.has_consent() {
            return None;
        }
        let visitor_cookie_id = self.visitor.visitor_id()?;
        Some(
            self.recorder
                .spawn_link_visitor_to_user(visitor_cookie_id, user_id.to_string()),
        )
    }
}
