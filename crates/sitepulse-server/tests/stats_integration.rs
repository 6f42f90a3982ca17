use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use sitepulse_core::{
    analytics::DateRange,
    clock::ManualClock,
    config::Config,
    consent::ConsentEnforcedUpstream,
    event::TrackingContext,
    model::{
        NewPageView, NewSession, NewVisitor, PageView, Session, SessionUpdate, Visitor,
        VisitorUpdate,
    },
    recorder::EventRecorder,
    store::{MemoryStore, SiteStore},
};
use sitepulse_duckdb::DuckDbStore;
use sitepulse_server::app::build_app;
use sitepulse_server::state::AppState;

fn ctx(visitor: &str, session: &str, path: &str, is_new_session: bool) -> TrackingContext {
    TrackingContext {
        visitor_cookie_id: visitor.to_string(),
        session_cookie_id: session.to_string(),
        page_path: path.to_string(),
        page_url: format!("https://example.com{path}"),
        is_new_session,
        ..TrackingContext::default()
    }
}

/// Three sessions on 2026-03-10: a Google bounce, a campaign bounce, and
/// a direct visit over three pages.
async fn seeded_app() -> axum::Router {
    let db = DuckDbStore::open_in_memory().expect("in-memory DuckDB");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
    let recorder = EventRecorder::new(
        Arc::new(db.clone()),
        Arc::new(ConsentEnforcedUpstream),
        Arc::new(clock.clone()),
    );

    let mut search = ctx("v_a", "s_a", "/", true);
    search.referrer = Some("https://www.google.com/".to_string());
    recorder.record(&search).await.expect("search");

    clock.advance(Duration::minutes(1));
    let mut campaign = ctx("v_b", "s_b", "/pricing", true);
    campaign.utm_source = Some("newsletter".to_string());
    recorder.record(&campaign).await.expect("campaign");

    clock.advance(Duration::minutes(1));
    recorder.record(&ctx("v_c", "s_c", "/", true)).await.expect("direct");
    for path in ["/pricing", "/docs"] {
        clock.advance(Duration::seconds(45));
        recorder
            .record(&ctx("v_c", "s_c", path, false))
            .await
            .expect("continuation");
    }

    build_app(Arc::new(AppState::new(db, Config::default())))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

const RANGE: &str = "start_date=2026-03-10&end_date=2026-03-10";

#[tokio::test]
async fn test_overview() {
    let app = seeded_app().await;
    let response = app
        .oneshot(get(&format!("/api/stats/overview?{RANGE}")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let data = &json_body(response).await["data"];
    assert_eq!(data["total_visits"], 3);
    assert_eq!(data["unique_visitors"], 3);
    assert_eq!(data["new_visitors"], 3);
    assert_eq!(data["returning_visitors"], 0);
    assert_eq!(data["bounce_rate"], 66.7);
    assert_eq!(data["avg_session_duration"], 30);
    assert_eq!(data["avg_pages_per_session"], 1.7);
}

#[tokio::test]
async fn test_sources_breakdown() {
    let app = seeded_app().await;
    let response = app
        .oneshot(get(&format!("/api/stats/sources?{RANGE}")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = json_body(response).await["data"]
        .as_array()
        .expect("array")
        .clone();
    let labels: Vec<&str> = rows
        .iter()
        .map(|r| r["source"].as_str().expect("source"))
        .collect();
    // Equal visit counts sort by name.
    assert_eq!(labels, vec!["Direct", "Organic Search", "newsletter"]);
    assert!(rows.iter().all(|r| r["visits"] == 1 && r["percentage"] == 33.3));
}

#[tokio::test]
async fn test_daily_and_empty_days() {
    let app = seeded_app().await;
    let response = app
        .oneshot(get(
            "/api/stats/daily?start_date=2026-03-09&end_date=2026-03-11",
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = json_body(response).await["data"]
        .as_array()
        .expect("array")
        .clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2026-03-10");
    assert_eq!(rows[0]["visits"], 3);
    assert_eq!(rows[0]["new_visitors"], 3);
}

#[tokio::test]
async fn test_top_pages_respects_limit() {
    let app = seeded_app().await;
    let response = app
        .oneshot(get(&format!("/api/stats/top-pages?{RANGE}&limit=2")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let rows = json_body(response).await["data"]
        .as_array()
        .expect("array")
        .clone();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["page_path"], "/");
    assert_eq!(rows[0]["views"], 2);
    assert_eq!(rows[1]["page_path"], "/pricing");
    assert_eq!(rows[1]["views"], 2);
}

#[tokio::test]
async fn test_invalid_queries_are_400() {
    let app = seeded_app().await;
    for uri in [
        "/api/stats/overview?start_date=2026-03-11&end_date=2026-03-10",
        "/api/stats/daily?start_date=March",
        "/api/stats/top-pages?limit=0",
        "/api/stats/top-pages?limit=500",
        "/api/stats/overview?end_date=-262143-01-03",
        "/api/stats/sources?start_date=%2B262142-12-31&end_date=%2B262142-12-31",
    ] {
        let response = app.clone().oneshot(get(uri)).await.expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error", "{uri}");
    }
}

/// Delegates to [`MemoryStore`] but stalls range reads.
struct SlowStore(MemoryStore);

#[async_trait]
impl SiteStore for SlowStore {
    async fn find_visitor_by_cookie(&self, id: &str) -> anyhow::Result<Option<Visitor>> {
        self.0.find_visitor_by_cookie(id).await
    }
    async fn insert_visitor(&self, v: NewVisitor) -> anyhow::Result<Visitor> {
        self.0.insert_visitor(v).await
    }
    async fn update_visitor(&self, id: &str, u: &VisitorUpdate) -> anyhow::Result<()> {
        self.0.update_visitor(id, u).await
    }
    async fn find_session_by_cookie(&self, id: &str) -> anyhow::Result<Option<Session>> {
        self.0.find_session_by_cookie(id).await
    }
    async fn insert_session(&self, s: NewSession) -> anyhow::Result<Session> {
        self.0.insert_session(s).await
    }
    async fn update_session(&self, id: &str, u: &SessionUpdate) -> anyhow::Result<()> {
        self.0.update_session(id, u).await
    }
    async fn insert_page_view(&self, p: NewPageView) -> anyhow::Result<PageView> {
        self.0.insert_page_view(p).await
    }
    async fn set_visitor_user(&self, v: &str, u: &str) -> anyhow::Result<()> {
        self.0.set_visitor_user(v, u).await
    }
    async fn set_sessions_user(&self, v: &str, u: &str) -> anyhow::Result<u64> {
        self.0.set_sessions_user(v, u).await
    }
    async fn set_page_views_user(&self, v: &str, u: &str) -> anyhow::Result<u64> {
        self.0.set_page_views_user(v, u).await
    }
    async fn sessions_started_between(&self, range: &DateRange) -> anyhow::Result<Vec<Session>> {
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        self.0.sessions_started_between(range).await
    }
    async fn visitors_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Visitor>> {
        self.0.visitors_by_ids(ids).await
    }
    async fn page_views_between(&self, range: &DateRange) -> anyhow::Result<Vec<PageView>> {
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        self.0.page_views_between(range).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_aggregation_times_out() {
    let config = Config {
        query_timeout_ms: 50,
        ..Config::default()
    };
    let state = AppState::with_store(Arc::new(SlowStore(MemoryStore::new())), config);
    let app = build_app(Arc::new(state));

    for endpoint in ["overview", "top-pages"] {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/stats/{endpoint}?{RANGE}")))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT, "{endpoint}");
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "query_timeout");
    }
}
