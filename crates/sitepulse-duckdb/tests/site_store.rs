use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use sitepulse_core::{
    analytics::DateRange,
    model::{NewPageView, NewSession, NewVisitor, SessionUpdate, VisitorUpdate},
    store::SiteStore,
};
use sitepulse_duckdb::DuckDbStore;

fn new_visitor(cookie: &str) -> NewVisitor {
    NewVisitor {
        visitor_cookie_id: cookie.to_string(),
        seen_at: Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
        user_id: None,
        first_referrer: Some("https://www.google.com/".to_string()),
        first_utm_source: Some("newsletter".to_string()),
        first_utm_medium: None,
        first_utm_campaign: Some("spring".to_string()),
        first_utm_term: None,
        first_utm_content: None,
        first_landing_page: Some("/".to_string()),
    }
}

fn new_session(cookie: &str, visitor_id: &str, day: u32) -> NewSession {
    NewSession {
        session_cookie_id: cookie.to_string(),
        visitor_id: visitor_id.to_string(),
        user_id: None,
        referrer: Some("https://www.google.com/".to_string()),
        referrer_domain: Some("google.com".to_string()),
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        utm_term: None,
        utm_content: None,
        landing_page: "/".to_string(),
        device_type: Some("desktop".to_string()),
        browser: Some("Chrome".to_string()),
        os: Some("macOS".to_string()),
        screen_resolution: Some("1920x1080".to_string()),
        started_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
    }
}

fn new_page_view(session_id: &str, visitor_id: &str, path: &str, day: u32) -> NewPageView {
    NewPageView {
        session_id: session_id.to_string(),
        visitor_id: visitor_id.to_string(),
        user_id: None,
        page_path: path.to_string(),
        page_url: format!("https://example.com{path}"),
        page_title: Some("Example".to_string()),
        previous_page_path: None,
        viewed_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 30).unwrap(),
    }
}

fn march(start: u32, end: u32) -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2026, 3, start).unwrap(),
        NaiveDate::from_ymd_opt(2026, 3, end).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_ping() {
    let db = DuckDbStore::open_in_memory().expect("db");
    db.ping().await.expect("ping");
    let store: Arc<dyn SiteStore> = Arc::new(db);
    store.ping().await.expect("ping via trait");
}

#[tokio::test]
async fn test_visitor_insert_find_update() {
    let db = DuckDbStore::open_in_memory().expect("db");
    assert!(db
        .find_visitor_by_cookie("v_1")
        .await
        .expect("find")
        .is_none());

    let inserted = db.insert_visitor(new_visitor("v_1")).await.expect("insert");
    let found = db
        .find_visitor_by_cookie("v_1")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(found, inserted);
    assert_eq!(found.total_visits, 1);
    assert_eq!(found.first_utm_source.as_deref(), Some("newsletter"));

    let later = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
    db.update_visitor(
        &inserted.id,
        &VisitorUpdate {
            last_seen_at: later,
            total_visits: 2,
            user_id: Some("u_1".to_string()),
        },
    )
    .await
    .expect("update");
    // A later update without a user id keeps the linked user.
    db.update_visitor(
        &inserted.id,
        &VisitorUpdate {
            last_seen_at: later,
            total_visits: 3,
            user_id: None,
        },
    )
    .await
    .expect("update");

    let updated = db
        .find_visitor_by_cookie("v_1")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(updated.last_seen_at, later);
    assert_eq!(updated.first_seen_at, inserted.first_seen_at);
    assert_eq!(updated.total_visits, 3);
    assert_eq!(updated.user_id.as_deref(), Some("u_1"));
    assert_eq!(updated.first_utm_campaign.as_deref(), Some("spring"));
}

#[tokio::test]
async fn test_duplicate_visitor_cookie_rejected() {
    let db = DuckDbStore::open_in_memory().expect("db");
    db.insert_visitor(new_visitor("v_1")).await.expect("insert");
    assert!(db.insert_visitor(new_visitor("v_1")).await.is_err());
}

#[tokio::test]
async fn test_session_insert_and_continue() {
    let db = DuckDbStore::open_in_memory().expect("db");
    let visitor = db.insert_visitor(new_visitor("v_1")).await.expect("visitor");
    let session = db
        .insert_session(new_session("s_1", &visitor.id, 10))
        .await
        .expect("session");
    assert_eq!(session.page_view_count, 1);
    assert!(session.is_bounce);

    db.update_session(
        &session.id,
        &SessionUpdate {
            page_view_count: 2,
            exit_page: "/pricing".to_string(),
            is_bounce: false,
            duration_seconds: 42,
        },
    )
    .await
    .expect("update");

    let found = db
        .find_session_by_cookie("s_1")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(found.page_view_count, 2);
    assert!(!found.is_bounce);
    assert_eq!(found.exit_page.as_deref(), Some("/pricing"));
    assert_eq!(found.duration_seconds, Some(42));
    assert_eq!(found.landing_page, "/");
    assert_eq!(found.started_at, session.started_at);
    assert_eq!(found.screen_resolution.as_deref(), Some("1920x1080"));
}

#[tokio::test]
async fn test_range_selects_are_day_inclusive() {
    let db = DuckDbStore::open_in_memory().expect("db");
    let visitor = db.insert_visitor(new_visitor("v_1")).await.expect("visitor");
    for (cookie, day) in [("s_9", 9), ("s_10", 10), ("s_11", 11), ("s_12", 12)] {
        let session = db
            .insert_session(new_session(cookie, &visitor.id, day))
            .await
            .expect("session");
        db.insert_page_view(new_page_view(&session.id, &visitor.id, "/", day))
            .await
            .expect("page view");
    }

    let sessions = db
        .sessions_started_between(&march(10, 11))
        .await
        .expect("sessions");
    let cookies: Vec<&str> = sessions
        .iter()
        .map(|s| s.session_cookie_id.as_str())
        .collect();
    assert_eq!(cookies, vec!["s_10", "s_11"]);

    let views = db
        .page_views_between(&march(12, 12))
        .await
        .expect("page views");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].page_title.as_deref(), Some("Example"));
}

#[tokio::test]
async fn test_visitors_by_ids() {
    let db = DuckDbStore::open_in_memory().expect("db");
    let a = db.insert_visitor(new_visitor("v_a")).await.expect("a");
    let b = db.insert_visitor(new_visitor("v_b")).await.expect("b");
    db.insert_visitor(new_visitor("v_c")).await.expect("c");

    let mut found = db
        .visitors_by_ids(&[a.id.clone(), b.id.clone(), "missing".to_string()])
        .await
        .expect("visitors");
    found.sort_by(|x, y| x.visitor_cookie_id.cmp(&y.visitor_cookie_id));
    assert_eq!(found, vec![a, b]);

    assert!(db.visitors_by_ids(&[]).await.expect("empty").is_empty());
}

#[tokio::test]
async fn test_user_backfill_counts_rows() {
    let db = DuckDbStore::open_in_memory().expect("db");
    let visitor = db.insert_visitor(new_visitor("v_1")).await.expect("visitor");
    let other = db.insert_visitor(new_visitor("v_2")).await.expect("other");
    let s1 = db
        .insert_session(new_session("s_1", &visitor.id, 10))
        .await
        .expect("s1");
    db.insert_session(new_session("s_2", &visitor.id, 11))
        .await
        .expect("s2");
    db.insert_session(new_session("s_3", &other.id, 11))
        .await
        .expect("s3");
    db.insert_page_view(new_page_view(&s1.id, &visitor.id, "/", 10))
        .await
        .expect("pv");

    db.set_visitor_user(&visitor.id, "u_1").await.expect("visitor user");
    assert_eq!(
        db.set_sessions_user(&visitor.id, "u_1").await.expect("sessions"),
        2
    );
    assert_eq!(
        db.set_page_views_user(&visitor.id, "u_1")
            .await
            .expect("page views"),
        1
    );

    let linked = db
        .find_session_by_cookie("s_2")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(linked.user_id.as_deref(), Some("u_1"));
    let untouched = db
        .find_session_by_cookie("s_3")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(untouched.user_id, None);
}

#[tokio::test]
async fn test_reopen_file_keeps_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sitepulse.db");
    let path = path.to_str().expect("utf8 path");

    {
        let db = DuckDbStore::open(path, "256MB").expect("open");
        db.insert_visitor(new_visitor("v_1")).await.expect("insert");
    }
    let db = DuckDbStore::open(path, "256MB").expect("reopen");
    assert!(db
        .find_visitor_by_cookie("v_1")
        .await
        .expect("find")
        .is_some());
}
