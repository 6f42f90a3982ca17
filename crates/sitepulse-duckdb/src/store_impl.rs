use anyhow::Result;
use async_trait::async_trait;

use sitepulse_core::analytics::DateRange;
use sitepulse_core::model::{
    NewPageView, NewSession, NewVisitor, PageView, Session, SessionUpdate, Visitor,
    VisitorUpdate,
};
use sitepulse_core::store::SiteStore;

use crate::{page_views, sessions, visitors, DuckDbStore};

#[async_trait]
impl SiteStore for DuckDbStore {
    async fn ping(&self) -> Result<()> {
        DuckDbStore::ping(self).await
    }

    async fn find_visitor_by_cookie(&self, visitor_cookie_id: &str) -> Result<Option<Visitor>> {
        visitors::find_visitor_by_cookie_inner(self, visitor_cookie_id).await
    }

    async fn insert_visitor(&self, visitor: NewVisitor) -> Result<Visitor> {
        visitors::insert_visitor_inner(self, visitor).await
    }

    async fn update_visitor(&self, id: &str, update: &VisitorUpdate) -> Result<()> {
        visitors::update_visitor_inner(self, id, update).await
    }

    async fn find_session_by_cookie(&self, session_cookie_id: &str) -> Result<Option<Session>> {
        sessions::find_session_by_cookie_inner(self, session_cookie_id).await
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        sessions::insert_session_inner(self, session).await
    }

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<()> {
        sessions::update_session_inner(self, id, update).await
    }

    async fn insert_page_view(&self, page_view: NewPageView) -> Result<PageView> {
        page_views::insert_page_view_inner(self, page_view).await
    }

    async fn set_visitor_user(&self, visitor_id: &str, user_id: &str) -> Result<()> {
        visitors::set_visitor_user_inner(self, visitor_id, user_id).await
    }

    async fn set_sessions_user(&self, visitor_id: &str, user_id: &str) -> Result<u64> {
        sessions::set_sessions_user_inner(self, visitor_id, user_id).await
    }

    async fn set_page_views_user(&self, visitor_id: &str, user_id: &str) -> Result<u64> {
        page_views::set_page_views_user_inner(self, visitor_id, user_id).await
    }

    async fn sessions_started_between(&self, range: &DateRange) -> Result<Vec<Session>> {
        sessions::sessions_started_between_inner(self, range).await
    }

    async fn visitors_by_ids(&self, ids: &[String]) -> Result<Vec<Visitor>> {
        visitors::visitors_by_ids_inner(self, ids).await
    }

    async fn page_views_between(&self, range: &DateRange) -> Result<Vec<PageView>> {
        page_views::page_views_between_inner(self, range).await
    }
}
