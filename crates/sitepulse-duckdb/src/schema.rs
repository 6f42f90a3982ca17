/// DuckDB initialization SQL.
///
/// Run on every open. Every statement is `IF NOT EXISTS`, so re-running it
/// against an existing file is a no-op.
///
/// An explicit memory limit is always set; DuckDB's default (80% of system
/// RAM) is not acceptable for a server process.
///
/// Timestamps are naive `TIMESTAMP` values holding UTC.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- VISITORS (one row per browser identity)
-- ===========================================
-- first_* columns are first-touch attribution: written on insert only.
CREATE TABLE IF NOT EXISTS site_visitors (
    id                  VARCHAR PRIMARY KEY,
    visitor_cookie_id   VARCHAR NOT NULL UNIQUE,
    first_seen_at       TIMESTAMP NOT NULL,
    last_seen_at        TIMESTAMP NOT NULL,
    total_visits        BIGINT NOT NULL DEFAULT 1,
    user_id             VARCHAR,
    first_referrer      VARCHAR,
    first_utm_source    VARCHAR,
    first_utm_medium    VARCHAR,
    first_utm_campaign  VARCHAR,
    first_utm_term      VARCHAR,
    first_utm_content   VARCHAR,
    first_landing_page  VARCHAR
);

-- ===========================================
-- SESSIONS
-- ===========================================
CREATE TABLE IF NOT EXISTS site_sessions (
    id                  VARCHAR PRIMARY KEY,
    session_cookie_id   VARCHAR NOT NULL UNIQUE,
    visitor_id          VARCHAR NOT NULL,           -- site_visitors.id; no FK, writes are not transactional
    user_id             VARCHAR,
    referrer            VARCHAR,
    referrer_domain     VARCHAR,
    utm_source          VARCHAR,
    utm_medium          VARCHAR,
    utm_campaign        VARCHAR,
    utm_term            VARCHAR,
    utm_content         VARCHAR,
    landing_page        VARCHAR NOT NULL,
    device_type         VARCHAR,
    browser             VARCHAR,
    os                  VARCHAR,
    screen_resolution   VARCHAR,
    started_at          TIMESTAMP NOT NULL,
    page_view_count     BIGINT NOT NULL DEFAULT 1,
    exit_page           VARCHAR,
    is_bounce           BOOLEAN NOT NULL DEFAULT TRUE,
    duration_seconds    BIGINT
);
CREATE INDEX IF NOT EXISTS idx_site_sessions_started ON site_sessions(started_at);
CREATE INDEX IF NOT EXISTS idx_site_sessions_visitor ON site_sessions(visitor_id);

-- ===========================================
-- PAGE VIEWS (append-only)
-- ===========================================
CREATE TABLE IF NOT EXISTS site_page_views (
    id                  VARCHAR PRIMARY KEY,
    session_id          VARCHAR NOT NULL,
    visitor_id          VARCHAR NOT NULL,
    user_id             VARCHAR,
    page_path           VARCHAR NOT NULL,
    page_url            VARCHAR NOT NULL,
    page_title          VARCHAR,
    previous_page_path  VARCHAR,
    viewed_at           TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_site_page_views_viewed ON site_page_views(viewed_at);
CREATE INDEX IF NOT EXISTS idx_site_page_views_visitor ON site_page_views(visitor_id);
"#
    )
}
