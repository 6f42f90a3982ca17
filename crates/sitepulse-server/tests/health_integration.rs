use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use sitepulse_core::{
    analytics::DateRange,
    config::Config,
    model::{
        NewPageView, NewSession, NewVisitor, PageView, Session, SessionUpdate, Visitor,
        VisitorUpdate,
    },
    store::SiteStore,
};
use sitepulse_duckdb::DuckDbStore;
use sitepulse_server::app::build_app;
use sitepulse_server::state::AppState;

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

/// A store whose every call fails.
struct DownStore;

#[async_trait]
impl SiteStore for DownStore {
    async fn ping(&self) -> anyhow::Result<()> {
        bail!("connection refused")
    }
    async fn find_visitor_by_cookie(&self, _: &str) -> anyhow::Result<Option<Visitor>> {
        bail!("connection refused")
    }
    async fn insert_visitor(&self, _: NewVisitor) -> anyhow::Result<Visitor> {
        bail!("connection refused")
    }
    async fn update_visitor(&self, _: &str, _: &VisitorUpdate) -> anyhow::Result<()> {
        bail!("connection refused")
    }
    async fn find_session_by_cookie(&self, _: &str) -> anyhow::Result<Option<Session>> {
        bail!("connection refused")
    }
    async fn insert_session(&self, _: NewSession) -> anyhow::Result<Session> {
        bail!("connection refused")
    }
    async fn update_session(&self, _: &str, _: &SessionUpdate) -> anyhow::Result<()> {
        bail!("connection refused")
    }
    async fn insert_page_view(&self, _: NewPageView) -> anyhow::Result<PageView> {
        bail!("connection refused")
    }
    async fn set_visitor_user(&self, _: &str, _: &str) -> anyhow::Result<()> {
        bail!("connection refused")
    }
    async fn set_sessions_user(&self, _: &str, _: &str) -> anyhow::Result<u64> {
        bail!("connection refused")
    }
    async fn set_page_views_user(&self, _: &str, _: &str) -> anyhow::Result<u64> {
        bail!("connection refused")
    }
    async fn sessions_started_between(&self, _: &DateRange) -> anyhow::Result<Vec<Session>> {
        bail!("connection refused")
    }
    async fn visitors_by_ids(&self, _: &[String]) -> anyhow::Result<Vec<Visitor>> {
        bail!("connection refused")
    }
    async fn page_views_between(&self, _: &DateRange) -> anyhow::Result<Vec<PageView>> {
        bail!("connection refused")
    }
}

#[tokio::test]
async fn test_health_returns_200_when_db_reachable() {
    let db = DuckDbStore::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, Config::default())));

    let response = app.oneshot(get("/health")).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_returns_503_when_store_down() {
    let state = AppState::with_store(Arc::new(DownStore), Config::default());
    let app = build_app(Arc::new(state));

    let response = app.oneshot(get("/health")).await.expect("request");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "degraded");
}

#[tokio::test]
async fn test_stats_failure_is_internal_error() {
    let state = AppState::with_store(Arc::new(DownStore), Config::default());
    let app = build_app(Arc::new(state));

    let response = app
        .oneshot(get("/api/stats/overview?start_date=2026-03-01&end_date=2026-03-07"))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "internal_error");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let db = DuckDbStore::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, Config::default())));
    let response = app.oneshot(get("/api/nope")).await.expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
