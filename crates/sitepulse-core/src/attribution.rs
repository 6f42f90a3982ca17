//! Campaign and referrer attribution, captured once on a session's landing
//! page and frozen for the rest of the session.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::clock::Clock;
use crate::event::NavigationContext;
use crate::storage::{keys, ClientStorage, StorageScope};

pub(crate) fn parse_url(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    parsed.host_str()?;
    Some(parsed)
}

/// Lower-case a host and drop a leading `www.`.
pub fn normalize_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Host of an absolute page URL, normalised with [`normalize_domain`].
pub fn site_domain(page_url: &str) -> Option<String> {
    parse_url(page_url)?.host_str().map(normalize_domain)
}

/// Domain of a referrer URL, normalised with [`normalize_domain`].
///
/// Returns `None` if the referrer is empty or has no usable host.
pub fn referrer_domain(referrer: &str) -> Option<String> {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return None;
    }
    if let Some(parsed) = parse_url(referrer) {
        return parsed.host_str().map(normalize_domain);
    }
    // Scheme-less referrers such as "news.ycombinator.com/item".
    let stripped = referrer
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split(['/', '?', '#']).next()?;
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() || !host.contains('.') {
        None
    } else {
        Some(normalize_domain(host))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl UtmParams {
    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none()
            && self.utm_medium.is_none()
            && self.utm_campaign.is_none()
            && self.utm_term.is_none()
            && self.utm_content.is_none()
    }
}

/// Read the five `utm_*` parameters from a URL's query string.
///
/// Empty values are ignored; the first non-empty occurrence of a key wins.
pub fn extract_utm_params(page_url: &str) -> UtmParams {
    let mut utm = UtmParams::default();
    let Some(parsed) = parse_url(page_url).or_else(|| {
        // Relative URLs: resolve against a throwaway base to reach the query.
        Url::parse("http://localhost").ok()?.join(page_url).ok()
    }) else {
        return utm;
    };

    for (key, value) in parsed.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &*key {
            "utm_source" => &mut utm.utm_source,
            "utm_medium" => &mut utm.utm_medium,
            "utm_campaign" => &mut utm.utm_campaign,
            "utm_term" => &mut utm.utm_term,
            "utm_content" => &mut utm.utm_content,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    utm
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReferrer {
    pub url: String,
    pub domain: String,
}

/// The referrer, unless it is missing, unparseable, or points at this site.
///
/// Internal navigation must never show up as an external referral.
pub fn extract_external_referrer(
    referrer: Option<&str>,
    site_domain: Option<&str>,
) -> Option<ExternalReferrer> {
    let url = referrer?.trim();
    let domain = referrer_domain(url)?;
    if site_domain.map(normalize_domain).as_deref() == Some(domain.as_str()) {
        return None;
    }
    Some(ExternalReferrer {
        url: url.to_string(),
        domain,
    })
}

/// Session-scoped attribution snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingAttribution {
    /// Session this snapshot belongs to; `None` when extracted live.
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub utm: UtmParams,
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub landing_page: String,
    pub captured_at: DateTime<Utc>,
}

impl LandingAttribution {
    /// Extract attribution from the navigation as it is right now.
    pub fn extract(nav: &NavigationContext, now: DateTime<Utc>) -> Self {
        let site_domain = nav.site_domain();
        let referrer = extract_external_referrer(nav.referrer.as_deref(), site_domain.as_deref());
        Self {
            session_id: None,
            utm: extract_utm_params(&nav.url),
            referrer_domain: referrer.as_ref().map(|r| r.domain.clone()),
            referrer: referrer.map(|r| r.url),
            landing_page: nav.page_path(),
            captured_at: now,
        }
    }
}

#[derive(Clone)]
pub struct AttributionCapture {
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
}

impl AttributionCapture {
    pub fn new(storage: Arc<dyn ClientStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn current_session_id(&self) -> Option<String> {
        self.storage.get(StorageScope::Session, keys::SESSION_ID)
    }

    /// The stored snapshot, if it belongs to the current session.
    pub fn stored(&self) -> Option<LandingAttribution> {
        let raw = self
            .storage
            .get(StorageScope::Session, keys::LANDING_ATTRIBUTION)?;
        let snapshot: LandingAttribution = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable landing attribution");
                return None;
            }
        };
        if snapshot.session_id != self.current_session_id() {
            return None;
        }
        Some(snapshot)
    }

    /// Freeze attribution for the current session.
    ///
    /// Returns `Ok(false)` without writing when a snapshot for this session
    /// already exists.
    pub fn persist_landing_attribution(&self, nav: &NavigationContext) -> Result<bool> {
        if self.stored().is_some() {
            return Ok(false);
        }
        let mut snapshot = LandingAttribution::extract(nav, self.clock.now());
        snapshot.session_id = self.current_session_id();
        let raw = serde_json::to_string(&snapshot)?;
        self.storage
            .set(StorageScope::Session, keys::LANDING_ATTRIBUTION, &raw)?;
        debug!(
            landing_page = %snapshot.landing_page,
            referrer_domain = ?snapshot.referrer_domain,
            utm_source = ?snapshot.utm.utm_source,
            "Landing attribution captured"
        );
        Ok(true)
    }

    /// The frozen snapshot, or a live extraction if none was persisted.
    pub fn get_landing_attribution(&self, nav: &NavigationContext) -> LandingAttribution {
        if let Some(snapshot) = self.stored() {
            return snapshot;
        }
        debug!("No landing attribution stored for this session; extracting live");
        LandingAttribution::extract(nav, self.clock.now())
    }
}
