use anyhow::Result;

use sitepulse_core::analytics::DateRange;
use sitepulse_core::model::{NewSession, Session, SessionUpdate};

use crate::backend::{format_ts, new_row_id, ts_column};
use crate::DuckDbStore;

const SESSION_COLUMNS: &str = "id, session_cookie_id, visitor_id, user_id, \
    referrer, referrer_domain, utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
    landing_page, device_type, browser, os, screen_resolution, \
    CAST(started_at AS VARCHAR), page_view_count, exit_page, is_bounce, duration_seconds";

fn session_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        session_cookie_id: row.get(1)?,
        visitor_id: row.get(2)?,
        user_id: row.get(3)?,
        referrer: row.get(4)?,
        referrer_domain: row.get(5)?,
        utm_source: row.get(6)?,
        utm_medium: row.get(7)?,
        utm_campaign: row.get(8)?,
        utm_term: row.get(9)?,
        utm_content: row.get(10)?,
        landing_page: row.get(11)?,
        device_type: row.get(12)?,
        browser: row.get(13)?,
        os: row.get(14)?,
        screen_resolution: row.get(15)?,
        started_at: ts_column(row, 16)?,
        page_view_count: row.get(17)?,
        exit_page: row.get(18)?,
        is_bounce: row.get(19)?,
        duration_seconds: row.get(20)?,
    })
}

pub(crate) async fn find_session_by_cookie_inner(
    db: &DuckDbStore,
    session_cookie_id: &str,
) -> Result<Option<Session>> {
    let conn = db.conn.lock().await;
    let sql = format!("SELECT {SESSION_COLUMNS} FROM site_sessions WHERE session_cookie_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(duckdb::params![session_cookie_id], session_from_row)?;
    Ok(rows.next().transpose()?)
}

pub(crate) async fn insert_session_inner(db: &DuckDbStore, session: NewSession) -> Result<Session> {
    let row = session.into_row(new_row_id());
    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO site_sessions (
            id, session_cookie_id, visitor_id, user_id,
            referrer, referrer_domain,
            utm_source, utm_medium, utm_campaign, utm_term, utm_content,
            landing_page, device_type, browser, os, screen_resolution,
            started_at, page_view_count, exit_page, is_bounce, duration_seconds
        ) VALUES (
            ?1,  ?2,  ?3,  ?4,
            ?5,  ?6,
            ?7,  ?8,  ?9,  ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21
        )"#,
        duckdb::params![
            row.id,
            row.session_cookie_id,
            row.visitor_id,
            row.user_id,
            row.referrer,
            row.referrer_domain,
            row.utm_source,
            row.utm_medium,
            row.utm_campaign,
            row.utm_term,
            row.utm_content,
            row.landing_page,
            row.device_type,
            row.browser,
            row.os,
            row.screen_resolution,
            format_ts(row.started_at),
            row.page_view_count,
            row.exit_page,
            row.is_bounce,
            row.duration_seconds,
        ],
    )?;
    Ok(row)
}

pub(crate) async fn update_session_inner(
    db: &DuckDbStore,
    id: &str,
    update: &SessionUpdate,
) -> Result<()> {
    let conn = db.conn.lock().await;
    conn.execute(
        "UPDATE site_sessions \
         SET page_view_count = ?1, exit_page = ?2, is_bounce = ?3, duration_seconds = ?4 \
         WHERE id = ?5",
        duckdb::params![
            update.page_view_count,
            update.exit_page,
            update.is_bounce,
            update.duration_seconds,
            id
        ],
    )?;
    Ok(())
}

pub(crate) async fn set_sessions_user_inner(
    db: &DuckDbStore,
    visitor_id: &str,
    user_id: &str,
) -> Result<u64> {
    let conn = db.conn.lock().await;
    let touched = conn.execute(
        "UPDATE site_sessions SET user_id = ?1 WHERE visitor_id = ?2",
        duckdb::params![user_id, visitor_id],
    )?;
    Ok(touched as u64)
}

/// Sessions with `started_at` in `[start_date, end_date + 1 day)`.
pub(crate) async fn sessions_started_between_inner(
    db: &DuckDbStore,
    range: &DateRange,
) -> Result<Vec<Session>> {
    let start_str = range.start_date.format("%Y-%m-%d").to_string();
    let end_next = range.day_after_end()?;
    let end_str = end_next.format("%Y-%m-%d").to_string();

    let conn = db.conn.lock().await;
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM site_sessions \
         WHERE started_at >= CAST(?1 AS TIMESTAMP) AND started_at < CAST(?2 AS TIMESTAMP) \
         ORDER BY started_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows_iter = stmt.query_map(duckdb::params![start_str, end_str], session_from_row)?;

    let mut sessions = Vec::new();
    for row in rows_iter {
        sessions.push(row?);
    }
    Ok(sessions)
}
