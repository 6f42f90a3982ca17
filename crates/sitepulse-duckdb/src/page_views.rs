use anyhow::Result;

use sitepulse_core::analytics::DateRange;
use sitepulse_core::model::{NewPageView, PageView};

use crate::backend::{format_ts, new_row_id, ts_column};
use crate::DuckDbStore;

pub(crate) async fn insert_page_view_inner(
    db: &DuckDbStore,
    page_view: NewPageView,
) -> Result<PageView> {
    let row = page_view.into_row(new_row_id());
    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO site_page_views (
            id, session_id, visitor_id, user_id,
            page_path, page_url, page_title, previous_page_path, viewed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        duckdb::params![
            row.id,
            row.session_id,
            row.visitor_id,
            row.user_id,
            row.page_path,
            row.page_url,
            row.page_title,
            row.previous_page_path,
            format_ts(row.viewed_at),
        ],
    )?;
    Ok(row)
}

pub(crate) async fn set_page_views_user_inner(
    db: &DuckDbStore,
    visitor_id: &str,
    user_id: &str,
) -> Result<u64> {
    let conn = db.conn.lock().await;
    let touched = conn.execute(
        "UPDATE site_page_views SET user_id = ?1 WHERE visitor_id = ?2",
        duckdb::params![user_id, visitor_id],
    )?;
    Ok(touched as u64)
}

pub(crate) async fn page_views_between_inner(
    db: &DuckDbStore,
    range: &DateRange,
) -> Result<Vec<PageView>> {
    let start_str = range.start_date.format("%Y-%m-%d").to_string();
    let end_next = range.day_after_end()?;
    let end_str = end_next.format("%Y-%m-%d").to_string();

    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, session_id, visitor_id, user_id, page_path, page_url, page_title, \
                previous_page_path, CAST(viewed_at AS VARCHAR) \
         FROM site_page_views \
         WHERE viewed_at >= CAST(?1 AS TIMESTAMP) AND viewed_at < CAST(?2 AS TIMESTAMP) \
         ORDER BY viewed_at",
    )?;
    let rows_iter = stmt.query_map(duckdb::params![start_str, end_str], |row| {
        Ok(PageView {
            id: row.get(0)?,
            session_id: row.get(1)?,
            visitor_id: row.get(2)?,
            user_id: row.get(3)?,
            page_path: row.get(4)?,
            page_url: row.get(5)?,
            page_title: row.get(6)?,
            previous_page_path: row.get(7)?,
            viewed_at: ts_column(row, 8)?,
        })
    })?;

    let mut page_views = Vec::new();
    for row in rows_iter {
        page_views.push(row?);
    }
    Ok(page_views)
}
