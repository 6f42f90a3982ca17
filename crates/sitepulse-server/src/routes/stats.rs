use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use sitepulse_core::analytics::{DateRange, DEFAULT_TOP_PAGES_LIMIT};

use crate::{error::AppError, state::AppState};

/// Days covered when the caller omits `start_date`.
const DEFAULT_RANGE_DAYS: u32 = 7;
const MAX_TOP_PAGES_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<usize>,
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{field} must be YYYY-MM-DD"))),
    }
}

/// Resolve the query's range, defaulting to the last seven days ending today.
pub fn resolve_range(query: &StatsQuery, today: NaiveDate) -> Result<DateRange, AppError> {
    let end_date = parse_date("end_date", query.end_date.as_deref())?.unwrap_or(today);
    let start_date = match parse_date("start_date", query.start_date.as_deref())? {
        Some(start_date) => start_date,
        None => DateRange::ending_on(end_date, DEFAULT_RANGE_DAYS)?.start_date,
    };
    Ok(DateRange::new(start_date, end_date)?)
}

fn resolve_limit(limit: Option<usize>) -> Result<usize, AppError> {
    match limit {
        None => Ok(DEFAULT_TOP_PAGES_LIMIT),
        Some(n) if (1..=MAX_TOP_PAGES_LIMIT).contains(&n) => Ok(n),
        Some(_) => Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_TOP_PAGES_LIMIT}"
        ))),
    }
}

/// Run an aggregation under the configured query timeout.
async fn with_timeout<T>(
    state: &AppState,
    query: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(state.config.query_timeout(), query).await {
        Ok(result) => result.map_err(AppError::Internal),
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.config.query_timeout_ms,
                "Aggregation query timed out"
            );
            Err(AppError::Timeout)
        }
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// `GET /api/stats/overview`
pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query, today())?;
    let result = with_timeout(&state, state.aggregation.get_overview_stats(&range)).await?;
    Ok(Json(json!({ "data": result })))
}

/// `GET /api/stats/sources`
pub async fn sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query, today())?;
    let result = with_timeout(
        &state,
        state.aggregation.get_traffic_source_breakdown(&range),
    )
    .await?;
    Ok(Json(json!({ "data": result })))
}

/// `GET /api/stats/daily`
pub async fn daily(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query, today())?;
    let result = with_timeout(&state, state.aggregation.get_daily_traffic(&range)).await?;
    Ok(Json(json!({ "data": result })))
}

/// `GET /api/stats/top-pages`
pub async fn top_pages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = resolve_range(&query, today())?;
    let limit = resolve_limit(query.limit)?;
    let result = with_timeout(&state, state.aggregation.get_top_pages(&range, limit)).await?;
    Ok(Json(json!({ "data": result })))
}
