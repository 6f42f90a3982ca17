use serde::{Deserialize, Serialize};

use crate::attribution::{self, parse_url};

/// What the browser knows about the navigation that just happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationContext {
    /// Full URL of the page, including query string.
    pub url: String,
    pub title: Option<String>,
    /// `document.referrer`; empty strings are treated as absent.
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl NavigationContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen_width = Some(width);
        self.screen_height = Some(height);
        self
    }

    /// Path component of [`Self::url`], without query or fragment.
    pub fn page_path(&self) -> String {
        if let Some(parsed) = parse_url(&self.url) {
            return parsed.path().to_string();
        }
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    /// The site's own domain, normalised the same way referrer domains are.
    pub fn site_domain(&self) -> Option<String> {
        attribution::site_domain(&self.url)
    }
}

/// One page view as handed from the client layer to the recorder, and the
/// wire payload of `POST /api/track`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingContext {
    pub visitor_cookie_id: String,
    pub session_cookie_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub page_path: String,
    pub page_url: String,
    #[serde(default)]
    pub page_title: Option<String>,
    /// Prior path in this session's client-side journey.
    #[serde(default)]
    pub previous_page_path: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub screen_resolution: Option<String>,
    pub is_new_session: bool,
}
