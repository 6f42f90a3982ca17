use anyhow::Result;

use sitepulse_core::model::{NewVisitor, Visitor, VisitorUpdate};

use crate::backend::{format_ts, new_row_id, ts_column};
use crate::DuckDbStore;

const VISITOR_COLUMNS: &str = "id, visitor_cookie_id, \
    CAST(first_seen_at AS VARCHAR), CAST(last_seen_at AS VARCHAR), \
    total_visits, user_id, first_referrer, \
    first_utm_source, first_utm_medium, first_utm_campaign, first_utm_term, first_utm_content, \
    first_landing_page";

fn visitor_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Visitor> {
    Ok(Visitor {
        id: row.get(0)?,
        visitor_cookie_id: row.get(1)?,
        first_seen_at: ts_column(row, 2)?,
        last_seen_at: ts_column(row, 3)?,
        total_visits: row.get(4)?,
        user_id: row.get(5)?,
        first_referrer: row.get(6)?,
        first_utm_source: row.get(7)?,
        first_utm_medium: row.get(8)?,
        first_utm_campaign: row.get(9)?,
        first_utm_term: row.get(10)?,
        first_utm_content: row.get(11)?,
        first_landing_page: row.get(12)?,
    })
}

pub(crate) async fn find_visitor_by_cookie_inner(
    db: &DuckDbStore,
    visitor_cookie_id: &str,
) -> Result<Option<Visitor>> {
    let conn = db.conn.lock().await;
    let sql = format!("SELECT {VISITOR_COLUMNS} FROM site_visitors WHERE visitor_cookie_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(duckdb::params![visitor_cookie_id], visitor_from_row)?;
    Ok(rows.next().transpose()?)
}

pub(crate) async fn insert_visitor_inner(db: &DuckDbStore, visitor: NewVisitor) -> Result<Visitor> {
    let row = visitor.into_row(new_row_id());
    let conn = db.conn.lock().await;
    conn.execute(
        r#"INSERT INTO site_visitors (
            id, visitor_cookie_id, first_seen_at, last_seen_at, total_visits, user_id,
            first_referrer, first_utm_source, first_utm_medium, first_utm_campaign,
            first_utm_term, first_utm_content, first_landing_page
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
        duckdb::params![
            row.id,
            row.visitor_cookie_id,
            format_ts(row.first_seen_at),
            format_ts(row.last_seen_at),
            row.total_visits,
            row.user_id,
            row.first_referrer,
            row.first_utm_source,
            row.first_utm_medium,
            row.first_utm_campaign,
            row.first_utm_term,
            row.first_utm_content,
            row.first_landing_page,
        ],
    )?;
    Ok(row)
}

/// First-touch columns are not part of the statement, so they can never be
/// overwritten here.
pub(crate) async fn update_visitor_inner(
    db: &DuckDbStore,
    id: &str,
    update: &VisitorUpdate,
) -> Result<()> {
    let conn = db.conn.lock().await;
    conn.execute(
        "UPDATE site_visitors \
         SET last_seen_at = ?1, total_visits = ?2, user_id = COALESCE(?3, user_id) \
         WHERE id = ?4",
        duckdb::params![
            format_ts(update.last_seen_at),
            update.total_visits,
            update.user_id,
            id
        ],
    )?;
    Ok(())
}

pub(crate) async fn set_visitor_user_inner(
    db: &DuckDbStore,
    visitor_id: &str,
    user_id: &str,
) -> Result<()> {
    let conn = db.conn.lock().await;
    conn.execute(
        "UPDATE site_visitors SET user_id = ?1 WHERE id = ?2",
        duckdb::params![user_id, visitor_id],
    )?;
    Ok(())
}

pub(crate) async fn visitors_by_ids_inner(db: &DuckDbStore, ids: &[String]) -> Result<Vec<Visitor>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {VISITOR_COLUMNS} FROM site_visitors WHERE id IN ({placeholders})");

    let conn = db.conn.lock().await;

    let params: Vec<Box<dyn duckdb::types::ToSql>> = ids
        .iter()
        .map(|id| Box::new(id.clone()) as Box<dyn duckdb::types::ToSql>)
        .collect();
    let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows_iter = stmt.query_map(param_refs.as_slice(), visitor_from_row)?;

    let mut visitors = Vec::new();
    for row in rows_iter {
        visitors.push(row?);
    }
    Ok(visitors)
}
