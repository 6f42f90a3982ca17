use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use sitepulse_core::{
    device::{detect_browser, detect_device_type, detect_os, UNKNOWN},
    event::TrackingContext,
};

use crate::{error::AppError, state::AppState};

const MAX_ID_LEN: usize = 128;
const MAX_URL_LEN: usize = 2048;
/// woothee's placeholder for fields it could not classify.
const WOOTHEE_UNKNOWN: &str = "UNKNOWN";

/// `POST /api/track`: hand one page view to the recorder.
///
/// Missing `device_type`, `browser` and `os` are filled from the
/// `User-Agent` header. Recording happens in the background; the response
/// is `202 Accepted` with `{"ok": true}` as soon as the payload validates.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut payload): Json<TrackingContext>,
) -> Result<impl IntoResponse, AppError> {
    validate_tracking(&payload)?;
    normalize_optional_fields(&mut payload);

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    fill_from_user_agent(&mut payload, user_agent);

    state.recorder.record_page_view(payload);
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentifyPayload {
    pub visitor_cookie_id: String,
    pub user_id: String,
}

/// `POST /api/identify`: back-fill a user id onto a visitor's history.
#[tracing::instrument(skip(state, payload))]
pub async fn identify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IdentifyPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_id("visitor_cookie_id", &payload.visitor_cookie_id)?;
    require_id("user_id", &payload.user_id)?;

    state
        .recorder
        .spawn_link_visitor_to_user(payload.visitor_cookie_id, payload.user_id);
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

fn require_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "{field} exceeds {MAX_ID_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_tracking(payload: &TrackingContext) -> Result<(), AppError> {
    require_id("visitor_cookie_id", &payload.visitor_cookie_id)?;
    require_id("session_cookie_id", &payload.session_cookie_id)?;
    if !payload.page_path.starts_with('/') {
        return Err(AppError::BadRequest(
            "page_path must start with '/'".to_string(),
        ));
    }
    if payload.page_url.trim().is_empty() {
        return Err(AppError::BadRequest("page_url is required".to_string()));
    }
    if payload.page_url.len() > MAX_URL_LEN || payload.page_path.len() > MAX_URL_LEN {
        return Err(AppError::BadRequest(format!(
            "page_url and page_path are limited to {MAX_URL_LEN} characters"
        )));
    }
    Ok(())
}

/// Blank optional strings are stored as NULL.
fn normalize_optional_fields(payload: &mut TrackingContext) {
    for field in [
        &mut payload.user_id,
        &mut payload.page_title,
        &mut payload.previous_page_path,
        &mut payload.referrer,
        &mut payload.utm_source,
        &mut payload.utm_medium,
        &mut payload.utm_campaign,
        &mut payload.utm_term,
        &mut payload.utm_content,
        &mut payload.device_type,
        &mut payload.browser,
        &mut payload.os,
        &mut payload.screen_resolution,
    ] {
        if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
            *field = None;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct UaInfo {
    device_type: String,
    browser: String,
    os: String,
}

/// Collapse woothee's versioned OS names onto the labels the client-side
/// classifier produces.
fn normalize_os(os: &str) -> String {
    match os {
        "iPhone" | "iPad" | "iPod" => "iOS".to_string(),
        "Mac OSX" => "macOS".to_string(),
        "ChromeOS" => "ChromeOS".to_string(),
        other if other.starts_with("Windows") => "Windows".to_string(),
        other => other.to_string(),
    }
}

/// Parse a `User-Agent` with `woothee`, falling back to the rule tables in
/// `sitepulse-core` for whatever woothee reports as unknown.
fn parse_user_agent(user_agent: &str) -> Option<UaInfo> {
    if user_agent.trim().is_empty() {
        return None;
    }
    let parsed = woothee::parser::Parser::new().parse(user_agent);
    let known = |value: &str| !value.is_empty() && value != WOOTHEE_UNKNOWN;

    let device_type = match parsed.as_ref().map(|r| r.category) {
        Some("smartphone") | Some("mobilephone") => "mobile".to_string(),
        Some("tablet") => "tablet".to_string(),
        Some("pc") => "desktop".to_string(),
        _ => detect_device_type(user_agent).as_str().to_string(),
    };
    let browser = match parsed.as_ref().map(|r| r.name) {
        Some(name) if known(name) => name.to_string(),
        _ => detect_browser(user_agent).to_string(),
    };
    let os = match parsed.as_ref().map(|r| r.os) {
        Some(os) if known(os) => normalize_os(os),
        _ => detect_os(user_agent).to_string(),
    };

    if browser == UNKNOWN && os == UNKNOWN {
        return None;
    }
    Some(UaInfo {
        device_type,
        browser,
        os,
    })
}

fn fill_from_user_agent(payload: &mut TrackingContext, user_agent: &str) {
    if payload.device_type.is_some() && payload.browser.is_some() && payload.os.is_some() {
        return;
    }
    let Some(info) = parse_user_agent(user_agent) else {
        return;
    };
    payload.device_type.get_or_insert(info.device_type);
    payload.browser.get_or_insert(info.browser);
    payload.os.get_or_insert(info.os);
}
