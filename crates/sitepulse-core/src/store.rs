//! Remote store abstraction over the `site_visitors`, `site_sessions` and
//! `site_page_views` tables.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::analytics::DateRange;
use crate::model::{
    NewPageView, NewSession, NewVisitor, PageView, Session, SessionUpdate, Visitor,
    VisitorUpdate,
};

/// Write and read operations the pipeline needs from the store.
///
/// Writes are individually atomic but the recorder's visitor → session →
/// page view sequence is not a transaction; implementations must not assume
/// a session row always has its visitor row or vice versa.
#[async_trait]
pub trait SiteStore: Send + Sync + 'static {
    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_visitor_by_cookie(&self, visitor_cookie_id: &str) -> Result<Option<Visitor>>;

    async fn insert_visitor(&self, visitor: NewVisitor) -> Result<Visitor>;

    async fn update_visitor(&self, id: &str, update: &VisitorUpdate) -> Result<()>;

    async fn find_session_by_cookie(&self, session_cookie_id: &str) -> Result<Option<Session>>;

    async fn insert_session(&self, session: NewSession) -> Result<Session>;

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<()>;

    async fn insert_page_view(&self, page_view: NewPageView) -> Result<PageView>;

    async fn set_visitor_user(&self, visitor_id: &str, user_id: &str) -> Result<()>;

    /// Returns the number of session rows touched.
    async fn set_sessions_user(&self, visitor_id: &str, user_id: &str) -> Result<u64>;

    /// Returns the number of page view rows touched.
    async fn set_page_views_user(&self, visitor_id: &str, user_id: &str) -> Result<u64>;

    /// Sessions whose `started_at` falls on a day inside `range`.
    async fn sessions_started_between(&self, range: &DateRange) -> Result<Vec<Session>>;

    /// Visitors whose internal id is in `ids`. Unknown ids are skipped.
    async fn visitors_by_ids(&self, ids: &[String]) -> Result<Vec<Visitor>>;

    /// Page views whose `viewed_at` falls on a day inside `range`.
    async fn page_views_between(&self, range: &DateRange) -> Result<Vec<PageView>>;
}

#[derive(Debug, Default)]
struct Tables {
    visitors: Vec<Visitor>,
    sessions: Vec<Session>,
    page_views: Vec<PageView>,
}

/// In-process [`SiteStore`], used by tests and embedded setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn visitors(&self) -> Vec<Visitor> {
        self.tables.lock().await.visitors.clone()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.tables.lock().await.sessions.clone()
    }

    pub async fn page_views(&self) -> Vec<PageView> {
        self.tables.lock().await.page_views.clone()
    }

    /// Insert fully-formed rows directly, bypassing the recorder.
    pub async fn seed(&self, visitors: Vec<Visitor>, sessions: Vec<Session>, page_views: Vec<PageView>) {
        let mut tables = self.tables.lock().await;
        tables.visitors.extend(visitors);
        tables.sessions.extend(sessions);
        tables.page_views.extend(page_views);
    }

    /// Delete a session row, as an out-of-band cleanup would.
    pub async fn remove_session(&self, session_cookie_id: &str) {
        self.tables
            .lock()
            .await
            .sessions
            .retain(|s| s.session_cookie_id != session_cookie_id);
    }
}

fn new_row_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn find_visitor_by_cookie(&self, visitor_cookie_id: &str) -> Result<Option<Visitor>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .visitors
            .iter()
            .find(|v| v.visitor_cookie_id == visitor_cookie_id)
            .cloned())
    }

    async fn insert_visitor(&self, visitor: NewVisitor) -> Result<Visitor> {
        let mut tables = self.tables.lock().await;
        if tables
            .visitors
            .iter()
            .any(|v| v.visitor_cookie_id == visitor.visitor_cookie_id)
        {
            bail!(
                "duplicate visitor_cookie_id: {}",
                visitor.visitor_cookie_id
            );
        }
        let row = visitor.into_row(new_row_id());
        tables.visitors.push(row.clone());
        Ok(row)
    }

    async fn update_visitor(&self, id: &str, update: &VisitorUpdate) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(row) = tables.visitors.iter_mut().find(|v| v.id == id) {
            row.last_seen_at = update.last_seen_at;
            row.total_visits = update.total_visits;
            if update.user_id.is_some() {
                row.user_id = update.user_id.clone();
            }
        }
        Ok(())
    }

    async fn find_session_by_cookie(&self, session_cookie_id: &str) -> Result<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.session_cookie_id == session_cookie_id)
            .cloned())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let mut tables = self.tables.lock().await;
        if tables
            .sessions
            .iter()
            .any(|s| s.session_cookie_id == session.session_cookie_id)
        {
            bail!(
                "duplicate session_cookie_id: {}",
                session.session_cookie_id
            );
        }
        let row = session.into_row(new_row_id());
        tables.sessions.push(row.clone());
        Ok(row)
    }

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(row) = tables.sessions.iter_mut().find(|s| s.id == id) {
            row.page_view_count = update.page_view_count;
            row.exit_page = Some(update.exit_page.clone());
            row.is_bounce = update.is_bounce;
            row.duration_seconds = Some(update.duration_seconds);
        }
        Ok(())
    }

    async fn insert_page_view(&self, page_view: NewPageView) -> Result<PageView> {
        let row = page_view.into_row(new_row_id());
        self.tables.lock().await.page_views.push(row.clone());
        Ok(row)
    }

    async fn set_visitor_user(&self, visitor_id: &str, user_id: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        for row in tables.visitors.iter_mut().filter(|v| v.id == visitor_id) {
            row.user_id = Some(user_id.to_string());
        }
        Ok(())
    }

    async fn set_sessions_user(&self, visitor_id: &str, user_id: &str) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut touched = 0;
        for row in tables.sessions.iter_mut().filter(|s| s.visitor_id == visitor_id) {
            row.user_id = Some(user_id.to_string());
            touched += 1;
        }
        Ok(touched)
    }

    async fn set_page_views_user(&self, visitor_id: &str, user_id: &str) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut touched = 0;
        for row in tables
            .page_views
            .iter_mut()
            .filter(|p| p.visitor_id == visitor_id)
        {
            row.user_id = Some(user_id.to_string());
            touched += 1;
        }
        Ok(touched)
    }

    async fn sessions_started_between(&self, range: &DateRange) -> Result<Vec<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .filter(|s| range.contains(s.started_at))
            .cloned()
            .collect())
    }

    async fn visitors_by_ids(&self, ids: &[String]) -> Result<Vec<Visitor>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .visitors
            .iter()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect())
    }

    async fn page_views_between(&self, range: &DateRange) -> Result<Vec<PageView>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .page_views
            .iter()
            .filter(|p| range.contains(p.viewed_at))
            .cloned()
            .collect())
    }
}
