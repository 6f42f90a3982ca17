//! Read-side aggregation over the three tracking tables.
//!
//! Every query fetches rows for a [`DateRange`] through [`SiteStore`] and then
//! reduces them with one of the pure `compute_*` functions below, so the
//! arithmetic can be tested without a store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::model::{PageView, Session, Visitor};
use crate::store::SiteStore;

pub const DEFAULT_TOP_PAGES_LIMIT: usize = 10;

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, CoreError> {
        if end_date < start_date {
            return Err(CoreError::InvalidRange {
                start: start_date,
                end: end_date,
            });
        }
        let range = Self {
            start_date,
            end_date,
        };
        range.day_after_end()?;
        Ok(range)
    }

    /// The `days` calendar days ending on `today`, both ends included.
    pub fn ending_on(today: NaiveDate, days: u32) -> Result<Self, CoreError> {
        let span = u64::from(days.max(1)) - 1;
        let start_date = today
            .checked_sub_days(Days::new(span))
            .ok_or(CoreError::DateOutOfRange { date: today })?;
        Self::new(start_date, today)
    }

    /// First day past the range. Fails only at the end of chrono's calendar.
    pub fn day_after_end(&self) -> Result<NaiveDate, CoreError> {
        self.end_date
            .succ_opt()
            .ok_or(CoreError::DateOutOfRange {
                date: self.end_date,
            })
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.contains_date(ts.date_naive())
    }

    /// Midnight UTC at the start of `start_date`.
    pub fn start_bound(&self) -> DateTime<Utc> {
        self.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after `end_date`; use with `<`.
    pub fn end_bound_exclusive(&self) -> Result<DateTime<Utc>, CoreError> {
        Ok(self.day_after_end()?.and_time(NaiveTime::MIN).and_utc())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverviewStats {
    pub total_visits: i64,
    pub unique_visitors: i64,
    pub new_visitors: i64,
    pub returning_visitors: i64,
    /// Percentage, one decimal.
    pub bounce_rate: f64,
    /// Whole seconds.
    pub avg_session_duration: i64,
    pub avg_pages_per_session: f64,
}

/// Bucket a session is attributed to, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrafficSource {
    Campaign(String),
    OrganicSearch,
    Social,
    Referral,
    Direct,
}

/// Search engine brand and the subdomains that serve its search results.
/// The bare brand domain always counts; other subdomains (mail, docs) do not.
const SEARCH_ENGINES: &[(&str, &[&str])] = &[
    ("google", &[]),
    ("bing", &["cn"]),
    ("yahoo", &["search"]),
    ("duckduckgo", &[]),
    ("baidu", &["m"]),
    ("yandex", &[]),
    ("ecosia", &[]),
];

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "t.co",
    "linkedin.com",
    "lnkd.in",
    "reddit.com",
    "pinterest.com",
    "youtube.com",
    "tiktok.com",
    "threads.net",
    "mastodon.social",
];

/// Country-code or generic ending such as `com`, `de` or `co.uk`.
fn looks_like_public_suffix(labels: &[&str]) -> bool {
    (1..=2).contains(&labels.len())
        && labels
            .iter()
            .all(|l| (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_alphabetic()))
}

/// `google.com`, `google.co.uk`, `search.yahoo.com` and `uk.search.yahoo.com`
/// match; `mail.google.com` does not.
pub fn is_search_engine(domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();
    SEARCH_ENGINES.iter().any(|(brand, search_hosts)| {
        labels.iter().rposition(|l| l == brand).is_some_and(|i| {
            looks_like_public_suffix(&labels[i + 1..])
                && match labels[..i].last() {
                    None => true,
                    Some(sub) => *sub == "www" || search_hosts.contains(sub),
                }
        })
    })
}

/// Exact match or subdomain of a known social network.
pub fn is_social(domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    SOCIAL_DOMAINS.iter().any(|social| {
        domain == *social
            || domain
                .strip_suffix(social)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

impl TrafficSource {
    pub fn classify(utm_source: Option<&str>, referrer_domain: Option<&str>) -> Self {
        if let Some(source) = utm_source.map(str::trim).filter(|s| !s.is_empty()) {
            return TrafficSource::Campaign(source.to_string());
        }
        match referrer_domain.map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) if is_search_engine(domain) => TrafficSource::OrganicSearch,
            Some(domain) if is_social(domain) => TrafficSource::Social,
            Some(_) => TrafficSource::Referral,
            None => TrafficSource::Direct,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TrafficSource::Campaign(source) => source,
            TrafficSource::OrganicSearch => "Organic Search",
            TrafficSource::Social => "Social",
            TrafficSource::Referral => "Referral",
            TrafficSource::Direct => "Direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSourceRow {
    pub source: String,
    pub visits: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrafficRow {
    pub date: NaiveDate,
    pub visits: i64,
    pub new_visitors: i64,
    pub returning_visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPageRow {
    pub page_path: String,
    pub views: i64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(part as f64 / total as f64 * 100.0)
}

/// Distinct visitor ids referenced by `sessions`, sorted.
pub fn session_visitor_ids(sessions: &[Session]) -> Vec<String> {
    sessions
        .iter()
        .map(|s| s.visitor_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn compute_overview(
    range: &DateRange,
    sessions: &[Session],
    visitors: &[Visitor],
) -> OverviewStats {
    if sessions.is_empty() {
        return OverviewStats::default();
    }
    let total_visits = sessions.len() as i64;
    let unique: BTreeSet<&str> = sessions.iter().map(|s| s.visitor_id.as_str()).collect();
    let unique_visitors = unique.len() as i64;

    // A visitor row missing after a partial write counts as returning.
    let new_visitors = visitors
        .iter()
        .filter(|v| unique.contains(v.id.as_str()) && range.contains(v.first_seen_at))
        .count() as i64;

    let bounces = sessions
        .iter()
        .filter(|s| s.is_bounce || s.page_view_count == 1)
        .count() as i64;
    let total_duration: i64 = sessions
        .iter()
        .map(|s| s.duration_seconds.unwrap_or(0))
        .sum();
    let total_pages: i64 = sessions.iter().map(|s| s.page_view_count).sum();

    OverviewStats {
        total_visits,
        unique_visitors,
        new_visitors,
        returning_visitors: unique_visitors - new_visitors,
        bounce_rate: percentage(bounces, total_visits),
        avg_session_duration: (total_duration as f64 / total_visits as f64).round() as i64,
        avg_pages_per_session: round1(total_pages as f64 / total_visits as f64),
    }
}

/// Visits per source, most visits first, ties broken by source name.
pub fn compute_traffic_sources(sessions: &[Session]) -> Vec<TrafficSourceRow> {
    let total = sessions.len() as i64;
    let mut counts: HashMap<String, i64> = HashMap::new();
    for session in sessions {
        let source = TrafficSource::classify(
            session.utm_source.as_deref(),
            session.referrer_domain.as_deref(),
        );
        *counts.entry(source.label().to_string()).or_insert(0) += 1;
    }

    let mut rows: Vec<TrafficSourceRow> = counts
        .into_iter()
        .map(|(source, visits)| TrafficSourceRow {
            percentage: percentage(visits, total),
            source,
            visits,
        })
        .collect();
    rows.sort_by(|a, b| b.visits.cmp(&a.visits).then_with(|| a.source.cmp(&b.source)));
    rows
}

/// One row per day with at least one session, ascending.
pub fn compute_daily_traffic(sessions: &[Session], visitors: &[Visitor]) -> Vec<DailyTrafficRow> {
    let first_seen: HashMap<&str, NaiveDate> = visitors
        .iter()
        .map(|v| (v.id.as_str(), v.first_seen_at.date_naive()))
        .collect();

    let mut days: BTreeMap<NaiveDate, DailyTrafficRow> = BTreeMap::new();
    for session in sessions {
        let date = session.started_at.date_naive();
        let row = days.entry(date).or_insert_with(|| DailyTrafficRow {
            date,
            visits: 0,
            new_visitors: 0,
            returning_visitors: 0,
        });
        row.visits += 1;
        if first_seen.get(session.visitor_id.as_str()) == Some(&date) {
            row.new_visitors += 1;
        } else {
            row.returning_visitors += 1;
        }
    }
    days.into_values().collect()
}

/// Most viewed paths, ties broken by path, truncated to `limit`.
pub fn compute_top_pages(page_views: &[PageView], limit: usize) -> Vec<TopPageRow> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for view in page_views {
        *counts.entry(view.page_path.as_str()).or_insert(0) += 1;
    }
    let mut rows: Vec<TopPageRow> = counts
        .into_iter()
        .map(|(page_path, views)| TopPageRow {
            page_path: page_path.to_string(),
            views,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.views
            .cmp(&a.views)
            .then_with(|| a.page_path.cmp(&b.page_path))
    });
    rows.truncate(limit);
    rows
}

/// Dashboard queries. Holds no mutable state; clone freely.
#[derive(Clone)]
pub struct AggregationService {
    store: Arc<dyn SiteStore>,
}

impl AggregationService {
    pub fn new(store: Arc<dyn SiteStore>) -> Self {
        Self { store }
    }

    async fn sessions_with_visitors(
        &self,
        range: &DateRange,
    ) -> Result<(Vec<Session>, Vec<Visitor>)> {
        let sessions = self.store.sessions_started_between(range).await?;
        if sessions.is_empty() {
            return Ok((sessions, Vec::new()));
        }
        let ids = session_visitor_ids(&sessions);
        let visitors = self.store.visitors_by_ids(&ids).await?;
        debug!(
            start = %range.start_date,
            end = %range.end_date,
            sessions = sessions.len(),
            visitors = visitors.len(),
            "Loaded sessions for aggregation"
        );
        Ok((sessions, visitors))
    }

    pub async fn get_overview_stats(&self, range: &DateRange) -> Result<OverviewStats> {
        let (sessions, visitors) = self.sessions_with_visitors(range).await?;
        Ok(compute_overview(range, &sessions, &visitors))
    }

    pub async fn get_traffic_source_breakdown(
        &self,
        range: &DateRange,
    ) -> Result<Vec<TrafficSourceRow>> {
        let sessions = self.store.sessions_started_between(range).await?;
        Ok(compute_traffic_sources(&sessions))
    }

    pub async fn get_daily_traffic(&self, range: &DateRange) -> Result<Vec<DailyTrafficRow>> {
        let (sessions, visitors) = self.sessions_with_visitors(range).await?;
        Ok(compute_daily_traffic(&sessions, &visitors))
    }

    pub async fn get_top_pages(&self, range: &DateRange, limit: usize) -> Result<Vec<TopPageRow>> {
        let page_views = self.store.page_views_between(range).await?;
        Ok(compute_top_pages(&page_views, limit))
    }
}
