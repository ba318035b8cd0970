//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: source-of-truth collaborators and the raw action log
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id               INTEGER PRIMARY KEY,
        created_at       DATETIME NOT NULL,
        is_premium       INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS opportunities (
        id               INTEGER PRIMARY KEY,
        title            TEXT NOT NULL,
        is_active        INTEGER NOT NULL DEFAULT 1,
        created_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_actions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL,
        action_type      TEXT NOT NULL,
        opportunity_id   INTEGER,
        metadata         JSON,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);
    CREATE INDEX IF NOT EXISTS idx_opportunities_active ON opportunities(is_active);
    CREATE INDEX IF NOT EXISTS idx_user_actions_triple
        ON user_actions(user_id, action_type, opportunity_id);
    CREATE INDEX IF NOT EXISTS idx_user_actions_created ON user_actions(created_at);
    "#,
    // Version 2: derived aggregates (regenerable from the action log)
    r#"
    CREATE TABLE IF NOT EXISTS user_analytics (
        user_id                    INTEGER PRIMARY KEY,
        viewed_opportunities       INTEGER NOT NULL DEFAULT 0,
        clicked_opportunities      INTEGER NOT NULL DEFAULT 0,
        participated_opportunities INTEGER NOT NULL DEFAULT 0,
        ignored_opportunities      INTEGER NOT NULL DEFAULT 0,
        total_sessions             INTEGER NOT NULL DEFAULT 0,
        total_time_spent           INTEGER NOT NULL DEFAULT 0,
        average_session_time       REAL NOT NULL DEFAULT 0,
        notifications_received     INTEGER NOT NULL DEFAULT 0,
        notifications_opened       INTEGER NOT NULL DEFAULT 0,
        total_revenue              REAL NOT NULL DEFAULT 0,
        days_since_registration    INTEGER NOT NULL DEFAULT 0,
        view_to_click_rate         REAL NOT NULL DEFAULT 0,
        click_to_participate_rate  REAL NOT NULL DEFAULT 0,
        overall_conversion_rate    REAL NOT NULL DEFAULT 0,
        last_activity_at           DATETIME,
        last_payment_at            DATETIME,
        created_at                 DATETIME NOT NULL,
        updated_at                 DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS daily_stats (
        date                       TEXT PRIMARY KEY,   -- YYYY-MM-DD (UTC)
        opportunities_viewed       INTEGER NOT NULL DEFAULT 0,
        opportunities_clicked      INTEGER NOT NULL DEFAULT 0,
        opportunities_participated INTEGER NOT NULL DEFAULT 0,
        total_sessions             INTEGER NOT NULL DEFAULT 0,
        average_session_time       REAL NOT NULL DEFAULT 0,
        active_users               INTEGER NOT NULL DEFAULT 0,
        new_users                  INTEGER NOT NULL DEFAULT 0,
        total_opportunities        INTEGER NOT NULL DEFAULT 0,
        notifications_sent         INTEGER NOT NULL DEFAULT 0,
        notifications_failed       INTEGER NOT NULL DEFAULT 0,
        notifications_opened       INTEGER NOT NULL DEFAULT 0,
        daily_revenue              REAL NOT NULL DEFAULT 0,
        new_subscriptions          INTEGER NOT NULL DEFAULT 0,
        conversion_rate            REAL NOT NULL DEFAULT 0,
        created_at                 DATETIME NOT NULL,
        updated_at                 DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS opportunity_stats (
        opportunity_id             INTEGER PRIMARY KEY,
        total_views                INTEGER NOT NULL DEFAULT 0,
        unique_views               INTEGER NOT NULL DEFAULT 0,
        total_clicks               INTEGER NOT NULL DEFAULT 0,
        unique_clicks              INTEGER NOT NULL DEFAULT 0,
        total_participations       INTEGER NOT NULL DEFAULT 0,
        unique_participations      INTEGER NOT NULL DEFAULT 0,
        total_ignores              INTEGER NOT NULL DEFAULT 0,
        unique_ignores             INTEGER NOT NULL DEFAULT 0,
        premium_user_views         INTEGER NOT NULL DEFAULT 0,
        free_user_views            INTEGER NOT NULL DEFAULT 0,
        view_to_click_rate         REAL NOT NULL DEFAULT 0,
        click_to_participate_rate  REAL NOT NULL DEFAULT 0,
        overall_conversion_rate    REAL NOT NULL DEFAULT 0,
        performance_score          REAL NOT NULL DEFAULT 0,
        created_at                 DATETIME NOT NULL,
        updated_at                 DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_engagement (
        user_id                    INTEGER NOT NULL,
        date                       TEXT NOT NULL,      -- YYYY-MM-DD (UTC)
        sessions_count             INTEGER NOT NULL DEFAULT 0,
        time_spent                 INTEGER NOT NULL DEFAULT 0,
        actions_count              INTEGER NOT NULL DEFAULT 0,
        opportunities_viewed       INTEGER NOT NULL DEFAULT 0,
        opportunities_clicked      INTEGER NOT NULL DEFAULT 0,
        opportunities_participated INTEGER NOT NULL DEFAULT 0,
        engagement_level           TEXT NOT NULL DEFAULT 'low',
        first_activity_at          DATETIME NOT NULL,
        last_activity_at           DATETIME NOT NULL,

        PRIMARY KEY (user_id, date)
    );

    CREATE INDEX IF NOT EXISTS idx_user_engagement_date ON user_engagement(date);
    CREATE INDEX IF NOT EXISTS idx_opportunity_stats_score
        ON opportunity_stats(performance_score DESC);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
