//! Persists page views into the three tracking tables.
//!
//! The visitor → session → page view sequence is three independent writes.
//! A failure part-way leaves the earlier rows in place; aggregation copes
//! with a visitor that has no sessions and a session whose visitor row is
//! missing.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::attribution::{extract_external_referrer, site_domain, ExternalReferrer};
use crate::clock::Clock;
use crate::consent::ConsentGate;
use crate::event::TrackingContext;
use crate::model::{NewPageView, NewSession, NewVisitor, Session, SessionUpdate, Visitor, VisitorUpdate};
use crate::store::SiteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    Created,
    Continued,
    /// Continuation whose session row was missing; created instead.
    Recreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    SkippedNoConsent,
    Recorded {
        visitor_created: bool,
        session: SessionWrite,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    SkippedNoConsent,
    UnknownVisitor,
    Linked { sessions: u64, page_views: u64 },
}

#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn SiteStore>,
    consent: Arc<dyn ConsentGate>,
    clock: Arc<dyn Clock>,
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn SiteStore>,
        consent: Arc<dyn ConsentGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            consent,
            clock,
        }
    }

    /// Fire-and-forget wrapper around [`Self::record`].
    ///
    /// Returns as soon as the task is spawned. Failures are logged and
    /// dropped; nothing is retried.
    pub fn record_page_view(&self, ctx: TrackingContext) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            match recorder.record(&ctx).await {
                Ok(outcome) => debug!(?outcome, page_path = %ctx.page_path, "Page view handled"),
                Err(e) => error!(
                    error = %e,
                    visitor_cookie_id = %ctx.visitor_cookie_id,
                    session_cookie_id = %ctx.session_cookie_id,
                    page_path = %ctx.page_path,
                    "Page view recording failed; event dropped"
                ),
            }
        })
    }

    pub async fn record(&self, ctx: &TrackingContext) -> Result<RecordOutcome> {
        if !self.consent.has_consent() {
            debug!("Analytics consent not granted; page view skipped");
            return Ok(RecordOutcome::SkippedNoConsent);
        }
        let now = self.clock.now();

        let (visitor, visitor_created) = self.upsert_visitor(ctx, now).await?;
        let (session, session_write) = self.resolve_session(ctx, &visitor, now).await?;

        self.store
            .insert_page_view(NewPageView {
                session_id: session.id,
                visitor_id: visitor.id,
                user_id: ctx.user_id.clone(),
                page_path: ctx.page_path.clone(),
                page_url: ctx.page_url.clone(),
                page_title: ctx.page_title.clone(),
                previous_page_path: ctx.previous_page_path.clone(),
                viewed_at: now,
            })
            .await?;

        Ok(RecordOutcome::Recorded {
            visitor_created,
            session: session_write,
        })
    }

    async fn upsert_visitor(
        &self,
        ctx: &TrackingContext,
        now: DateTime<Utc>,
    ) -> Result<(Visitor, bool)> {
        match self.store.find_visitor_by_cookie(&ctx.visitor_cookie_id).await? {
            None => {
                let visitor = self
                    .store
                    .insert_visitor(NewVisitor {
                        visitor_cookie_id: ctx.visitor_cookie_id.clone(),
                        seen_at: now,
                        user_id: ctx.user_id.clone(),
                        first_referrer: external_referrer(ctx).map(|r| r.url),
                        first_utm_source: ctx.utm_source.clone(),
                        first_utm_medium: ctx.utm_medium.clone(),
                        first_utm_campaign: ctx.utm_campaign.clone(),
                        first_utm_term: ctx.utm_term.clone(),
                        first_utm_content: ctx.utm_content.clone(),
                        first_landing_page: Some(ctx.page_path.clone()),
                    })
                    .await?;
                Ok((visitor, true))
            }
            Some(mut visitor) => {
                // Read-then-write: concurrent page views may undercount.
                let update = VisitorUpdate {
                    last_seen_at: now,
                    total_visits: visitor.total_visits + i64::from(ctx.is_new_session),
                    user_id: match visitor.user_id {
                        None => ctx.user_id.clone(),
                        Some(_) => None,
                    },
                };
                self.store.update_visitor(&visitor.id, &update).await?;
                visitor.last_seen_at = update.last_seen_at;
                visitor.total_visits = update.total_visits;
                if update.user_id.is_some() {
                    visitor.user_id = update.user_id;
                }
                Ok((visitor, false))
            }
        }
    }

    async fn resolve_session(
        &self,
        ctx: &TrackingContext,
        visitor: &Visitor,
        now: DateTime<Utc>,
    ) -> Result<(Session, SessionWrite)> {
        if ctx.is_new_session {
            let session = self
                .store
                .insert_session(new_session(ctx, &visitor.id, now))
                .await?;
            return Ok((session, SessionWrite::Created));
        }

        match self.store.find_session_by_cookie(&ctx.session_cookie_id).await? {
            Some(mut session) => {
                let update = SessionUpdate {
                    page_view_count: session.page_view_count + 1,
                    exit_page: ctx.page_path.clone(),
                    is_bounce: false,
                    duration_seconds: (now - session.started_at).num_seconds().max(0),
                };
                self.store.update_session(&session.id, &update).await?;
                session.page_view_count = update.page_view_count;
                session.exit_page = Some(update.exit_page);
                session.is_bounce = update.is_bounce;
                session.duration_seconds = Some(update.duration_seconds);
                Ok((session, SessionWrite::Continued))
            }
            None => {
                warn!(
                    session_cookie_id = %ctx.session_cookie_id,
                    "Continuing session not found in store; creating it"
                );
                let session = self
                    .store
                    .insert_session(new_session(ctx, &visitor.id, now))
                    .await?;
                Ok((session, SessionWrite::Recreated))
            }
        }
    }

    /// Back-fill `user_id` onto a visitor and everything it recorded.
    ///
    /// Three separate updates; a failure after the first leaves the visitor
    /// linked and the rest untouched until the next attempt.
    pub async fn link_visitor_to_user(
        &self,
        visitor_cookie_id: &str,
        user_id: &str,
    ) -> Result<LinkOutcome> {
        if !self.consent.has_consent() {
            return Ok(LinkOutcome::SkippedNoConsent);
        }
        let Some(visitor) = self.store.find_visitor_by_cookie(visitor_cookie_id).await? else {
            debug!(visitor_cookie_id, "No visitor row to link");
            return Ok(LinkOutcome::UnknownVisitor);
        };

        self.store.set_visitor_user(&visitor.id, user_id).await?;
        let sessions = self.store.set_sessions_user(&visitor.id, user_id).await?;
        let page_views = self.store.set_page_views_user(&visitor.id, user_id).await?;
        info!(
            visitor_id = %visitor.id,
            sessions,
            page_views,
            "Visitor linked to user"
        );
        Ok(LinkOutcome::Linked {
            sessions,
            page_views,
        })
    }

    pub fn spawn_link_visitor_to_user(
        &self,
        visitor_cookie_id: String,
        user_id: String,
    ) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder
                .link_visitor_to_user(&visitor_cookie_id, &user_id)
                .await
            {
                error!(error = %e, visitor_cookie_id = %visitor_cookie_id, "Linking visitor to user failed");
            }
        })
    }
}

/// The context's referrer, unless it points back at the page's own site.
fn external_referrer(ctx: &TrackingContext) -> Option<ExternalReferrer> {
    extract_external_referrer(ctx.referrer.as_deref(), site_domain(&ctx.page_url).as_deref())
}

fn new_session(ctx: &TrackingContext, visitor_id: &str, now: DateTime<Utc>) -> NewSession {
    let referrer = external_referrer(ctx);
    NewSession {
        session_cookie_id: ctx.session_cookie_id.clone(),
        visitor_id: visitor_id.to_string(),
        user_id: ctx.user_id.clone(),
        referrer_domain: referrer.as_ref().map(|r| r.domain.clone()),
        referrer: referrer.map(|r| r.url),
        utm_source: ctx.utm_source.clone(),
        utm_medium: ctx.utm_medium.clone(),
        utm_campaign: ctx.utm_campaign.clone(),
        utm_term: ctx.utm_term.clone(),
        utm_content: ctx.utm_content.clone(),
        landing_page: ctx.page_path.clone(),
        device_type: ctx.device_type.clone(),
        browser: ctx.browser.clone(),
        os: ctx.os.clone(),
        screen_resolution: ctx.screen_resolution.clone(),
        started_at: now,
    }
}
