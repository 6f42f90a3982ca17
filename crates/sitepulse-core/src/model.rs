//! Rows of the three tracking tables, plus the insert/update shapes the
//! recorder sends to a [`crate::store::SiteStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `site_visitors` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: String,
    pub visitor_cookie_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub total_visits: i64,
    pub user_id: Option<String>,
    // First-touch attribution. Written on insert, never updated.
    pub first_referrer: Option<String>,
    pub first_utm_source: Option<String>,
    pub first_utm_medium: Option<String>,
    pub first_utm_campaign: Option<String>,
    pub first_utm_term: Option<String>,
    pub first_utm_content: Option<String>,
    pub first_landing_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVisitor {
    pub visitor_cookie_id: String,
    pub seen_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub first_referrer: Option<String>,
    pub first_utm_source: Option<String>,
    pub first_utm_medium: Option<String>,
    pub first_utm_campaign: Option<String>,
    pub first_utm_term: Option<String>,
    pub first_utm_content: Option<String>,
    pub first_landing_page: Option<String>,
}

/// Mutable part of a visitor. First-touch fields are deliberately absent.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorUpdate {
    pub last_seen_at: DateTime<Utc>,
    pub total_visits: i64,
    pub user_id: Option<String>,
}

/// `site_sessions` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub session_cookie_id: String,
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub landing_page: String,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub screen_resolution: Option<String>,
    pub started_at: DateTime<Utc>,
    pub page_view_count: i64,
    pub exit_page: Option<String>,
    pub is_bounce: bool,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub session_cookie_id: String,
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub landing_page: String,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub screen_resolution: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Applied to a session on every page view after the first.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub page_view_count: i64,
    pub exit_page: String,
    pub is_bounce: bool,
    pub duration_seconds: i64,
}

/// `site_page_views` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub page_path: String,
    pub page_url: String,
    pub page_title: Option<String>,
    pub previous_page_path: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPageView {
    pub session_id: String,
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub page_path: String,
    pub page_url: String,
    pub page_title: Option<String>,
    pub previous_page_path: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

impl NewVisitor {
    pub fn into_row(self, id: String) -> Visitor {
        Visitor {
            id,
            visitor_cookie_id: self.visitor_cookie_id,
            first_seen_at: self.seen_at,
            last_seen_at: self.seen_at,
            total_visits: 1,
            user_id: self.user_id,
            first_referrer: self.first_referrer,
            first_utm_source: self.first_utm_source,
            first_utm_medium: self.first_utm_medium,
            first_utm_campaign: self.first_utm_campaign,
            first_utm_term: self.first_utm_term,
            first_utm_content: self.first_utm_content,
            first_landing_page: self.first_landing_page,
        }
    }
}

impl NewSession {
    /// Row as first inserted: one page view, a bounce, zero duration.
    pub fn into_row(self, id: String) -> Session {
        Session {
            id,
            session_cookie_id: self.session_cookie_id,
            visitor_id: self.visitor_id,
            user_id: self.user_id,
            referrer: self.referrer,
            referrer_domain: self.referrer_domain,
            utm_source: self.utm_source,
            utm_medium: self.utm_medium,
            utm_campaign: self.utm_campaign,
            utm_term: self.utm_term,
            utm_content: self.utm_content,
            exit_page: Some(self.landing_page.clone()),
            landing_page: self.landing_page,
            device_type: self.device_type,
            browser: self.browser,
            os: self.os,
            screen_resolution: self.screen_resolution,
            started_at: self.started_at,
            page_view_count: 1,
            is_bounce: true,
            duration_seconds: Some(0),
        }
    }
}

impl NewPageView {
    pub fn into_row(self, id: String) -> PageView {
        PageView {
            id,
            session_id: self.session_id,
            visitor_id: self.visitor_id,
            user_id: self.user_id,
            page_path: self.page_path,
            page_url: self.page_url,
            page_title: self.page_title,
            previous_page_path: self.previous_page_path,
            viewed_at: self.viewed_at,
        }
    }
}
