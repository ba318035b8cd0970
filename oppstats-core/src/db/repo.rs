//! Database repository layer
//!
//! Implements every store contract from [`crate::store`] on top of SQLite.

use crate::error::{Error, Result};
use crate::store::{
    ActionStore, DailyStatsStore, OpportunityCatalog, OpportunityStatsStore, UserAnalyticsStore,
    UserDirectory, UserEngagementStore,
};
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// Storage format for day keys.
const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_ANALYTICS_KEY: &[&str] = &["user_id"];
const USER_ANALYTICS_COLUMNS: &[&str] = &[
    "user_id",
    "viewed_opportunities",
    "clicked_opportunities",
    "participated_opportunities",
    "ignored_opportunities",
    "total_sessions",
    "total_time_spent",
    "average_session_time",
    "notifications_received",
    "notifications_opened",
    "total_revenue",
    "days_since_registration",
    "view_to_click_rate",
    "click_to_participate_rate",
    "overall_conversion_rate",
    "last_activity_at",
    "last_payment_at",
    "created_at",
    "updated_at",
];

const DAILY_STATS_KEY: &[&str] = &["date"];
const DAILY_STATS_COLUMNS: &[&str] = &[
    "date",
    "opportunities_viewed",
    "opportunities_clicked",
    "opportunities_participated",
    "total_sessions",
    "average_session_time",
    "active_users",
    "new_users",
    "total_opportunities",
    "notifications_sent",
    "notifications_failed",
    "notifications_opened",
    "daily_revenue",
    "new_subscriptions",
    "conversion_rate",
    "created_at",
    "updated_at",
];

const OPPORTUNITY_STATS_KEY: &[&str] = &["opportunity_id"];
const OPPORTUNITY_STATS_COLUMNS: &[&str] = &[
    "opportunity_id",
    "total_views",
    "unique_views",
    "total_clicks",
    "unique_clicks",
    "total_participations",
    "unique_participations",
    "total_ignores",
    "unique_ignores",
    "premium_user_views",
    "free_user_views",
    "view_to_click_rate",
    "click_to_participate_rate",
    "overall_conversion_rate",
    "performance_score",
    "created_at",
    "updated_at",
];

const USER_ENGAGEMENT_KEY: &[&str] = &["user_id", "date"];
const USER_ENGAGEMENT_COLUMNS: &[&str] = &[
    "user_id",
    "date",
    "sessions_count",
    "time_spent",
    "actions_count",
    "opportunities_viewed",
    "opportunities_clicked",
    "opportunities_participated",
    "engagement_level",
    "first_activity_at",
    "last_activity_at",
];

/// How an aggregate write treats an existing row with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    /// Plain insert; a duplicate key is an error
    Fail,
    /// Keep the existing row untouched
    Ignore,
    /// Overwrite every column except the key and `created_at`
    Replace,
}

fn aggregate_insert_sql(
    table: &str,
    key: &[&str],
    columns: &[&str],
    on_conflict: OnConflict,
) -> String {
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );

    match on_conflict {
        OnConflict::Fail => {}
        OnConflict::Ignore => {
            sql.push_str(&format!(" ON CONFLICT({}) DO NOTHING", key.join(", ")));
        }
        OnConflict::Replace => {
            let assignments = columns
                .iter()
                .filter(|c| !key.contains(*c) && **c != "created_at")
                .map(|c| format!("{c} = excluded.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " ON CONFLICT({}) DO UPDATE SET {}",
                key.join(", "),
                assignments
            ));
        }
    }

    sql
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_failure(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn get_timestamp(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let idx = row.as_ref().column_index(column)?;
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

fn get_optional_timestamp(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let idx = row.as_ref().column_index(column)?;
    let value: Option<String> = row.get(idx)?;
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_failure(idx, e))
        })
        .transpose()
}

fn get_date(row: &Row, column: &str) -> rusqlite::Result<NaiveDate> {
    let idx = row.as_ref().column_index(column)?;
    let value: String = row.get(idx)?;
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|e| conversion_failure(idx, e))
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Source-of-truth rows
    // ============================================

    /// Insert or update a user
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO users (id, created_at, is_premium)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                is_premium = excluded.is_premium
            "#,
            params![user.id, user.created_at.to_rfc3339(), user.is_premium],
        )?;
        Ok(())
    }

    /// Insert or update an opportunity
    pub fn upsert_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO opportunities (id, title, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                is_active = excluded.is_active
            "#,
            params![
                opportunity.id,
                opportunity.title,
                opportunity.is_active,
                opportunity.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get an opportunity by ID
    pub fn get_opportunity(&self, id: OpportunityId) -> Result<Option<Opportunity>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM opportunities WHERE id = ?",
            [id],
            Self::row_to_opportunity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            created_at: get_timestamp(row, "created_at")?,
            is_premium: row.get("is_premium")?,
        })
    }

    fn row_to_opportunity(row: &Row) -> rusqlite::Result<Opportunity> {
        Ok(Opportunity {
            id: row.get("id")?,
            title: row.get("title")?,
            is_active: row.get("is_active")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    // ============================================
    // Row mapping for aggregates
    // ============================================

    fn row_to_user_analytics(row: &Row) -> rusqlite::Result<UserAnalytics> {
        Ok(UserAnalytics {
            user_id: row.get("user_id")?,
            viewed_opportunities: row.get("viewed_opportunities")?,
            clicked_opportunities: row.get("clicked_opportunities")?,
            participated_opportunities: row.get("participated_opportunities")?,
            ignored_opportunities: row.get("ignored_opportunities")?,
            total_sessions: row.get("total_sessions")?,
            total_time_spent: row.get("total_time_spent")?,
            average_session_time: row.get("average_session_time")?,
            notifications_received: row.get("notifications_received")?,
            notifications_opened: row.get("notifications_opened")?,
            total_revenue: row.get("total_revenue")?,
            days_since_registration: row.get("days_since_registration")?,
            view_to_click_rate: row.get("view_to_click_rate")?,
            click_to_participate_rate: row.get("click_to_participate_rate")?,
            overall_conversion_rate: row.get("overall_conversion_rate")?,
            last_activity_at: get_optional_timestamp(row, "last_activity_at")?,
            last_payment_at: get_optional_timestamp(row, "last_payment_at")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }

    fn row_to_daily_stats(row: &Row) -> rusqlite::Result<DailyStats> {
        Ok(DailyStats {
            date: get_date(row, "date")?,
            opportunities_viewed: row.get("opportunities_viewed")?,
            opportunities_clicked: row.get("opportunities_clicked")?,
            opportunities_participated: row.get("opportunities_participated")?,
            total_sessions: row.get("total_sessions")?,
            average_session_time: row.get("average_session_time")?,
            active_users: row.get("active_users")?,
            new_users: row.get("new_users")?,
            total_opportunities: row.get("total_opportunities")?,
            notifications_sent: row.get("notifications_sent")?,
            notifications_failed: row.get("notifications_failed")?,
            notifications_opened: row.get("notifications_opened")?,
            daily_revenue: row.get("daily_revenue")?,
            new_subscriptions: row.get("new_subscriptions")?,
            conversion_rate: row.get("conversion_rate")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }

    fn row_to_opportunity_stats(row: &Row) -> rusqlite::Result<OpportunityStats> {
        Ok(OpportunityStats {
            opportunity_id: row.get("opportunity_id")?,
            total_views: row.get("total_views")?,
            unique_views: row.get("unique_views")?,
            total_clicks: row.get("total_clicks")?,
            unique_clicks: row.get("unique_clicks")?,
            total_participations: row.get("total_participations")?,
            unique_participations: row.get("unique_participations")?,
            total_ignores: row.get("total_ignores")?,
            unique_ignores: row.get("unique_ignores")?,
            premium_user_views: row.get("premium_user_views")?,
            free_user_views: row.get("free_user_views")?,
            view_to_click_rate: row.get("view_to_click_rate")?,
            click_to_participate_rate: row.get("click_to_participate_rate")?,
            overall_conversion_rate: row.get("overall_conversion_rate")?,
            performance_score: row.get("performance_score")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }

    fn row_to_user_engagement(row: &Row) -> rusqlite::Result<UserEngagement> {
        let level_idx = row.as_ref().column_index("engagement_level")?;
        let level: String = row.get(level_idx)?;

        Ok(UserEngagement {
            user_id: row.get("user_id")?,
            date: get_date(row, "date")?,
            sessions_count: row.get("sessions_count")?,
            time_spent: row.get("time_spent")?,
            actions_count: row.get("actions_count")?,
            opportunities_viewed: row.get("opportunities_viewed")?,
            opportunities_clicked: row.get("opportunities_clicked")?,
            opportunities_participated: row.get("opportunities_participated")?,
            engagement_level: level
                .parse()
                .map_err(|e: String| conversion_failure(level_idx, e))?,
            first_activity_at: get_timestamp(row, "first_activity_at")?,
            last_activity_at: get_timestamp(row, "last_activity_at")?,
        })
    }

    // ============================================
    // Aggregate writes
    // ============================================

    fn write_user_analytics(
        conn: &Connection,
        a: &UserAnalytics,
        on_conflict: OnConflict,
    ) -> rusqlite::Result<usize> {
        let sql = aggregate_insert_sql(
            "user_analytics",
            USER_ANALYTICS_KEY,
            USER_ANALYTICS_COLUMNS,
            on_conflict,
        );
        conn.prepare_cached(&sql)?.execute(params![
            a.user_id,
            a.viewed_opportunities,
            a.clicked_opportunities,
            a.participated_opportunities,
            a.ignored_opportunities,
            a.total_sessions,
            a.total_time_spent,
            a.average_session_time,
            a.notifications_received,
            a.notifications_opened,
            a.total_revenue,
            a.days_since_registration,
            a.view_to_click_rate,
            a.click_to_participate_rate,
            a.overall_conversion_rate,
            a.last_activity_at.map(|t| t.to_rfc3339()),
            a.last_payment_at.map(|t| t.to_rfc3339()),
            a.created_at.to_rfc3339(),
            a.updated_at.to_rfc3339(),
        ])
    }

    fn write_daily_stats(
        conn: &Connection,
        s: &DailyStats,
        on_conflict: OnConflict,
    ) -> rusqlite::Result<usize> {
        let sql = aggregate_insert_sql(
            "daily_stats",
            DAILY_STATS_KEY,
            DAILY_STATS_COLUMNS,
            on_conflict,
        );
        conn.prepare_cached(&sql)?.execute(params![
            date_key(s.date),
            s.opportunities_viewed,
            s.opportunities_clicked,
            s.opportunities_participated,
            s.total_sessions,
            s.average_session_time,
            s.active_users,
            s.new_users,
            s.total_opportunities,
            s.notifications_sent,
            s.notifications_failed,
            s.notifications_opened,
            s.daily_revenue,
            s.new_subscriptions,
            s.conversion_rate,
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        ])
    }

    fn write_opportunity_stats(
        conn: &Connection,
        s: &OpportunityStats,
        on_conflict: OnConflict,
    ) -> rusqlite::Result<usize> {
        let sql = aggregate_insert_sql(
            "opportunity_stats",
            OPPORTUNITY_STATS_KEY,
            OPPORTUNITY_STATS_COLUMNS,
            on_conflict,
        );
        conn.prepare_cached(&sql)?.execute(params![
            s.opportunity_id,
            s.total_views,
            s.unique_views,
            s.total_clicks,
            s.unique_clicks,
            s.total_participations,
            s.unique_participations,
            s.total_ignores,
            s.unique_ignores,
            s.premium_user_views,
            s.free_user_views,
            s.view_to_click_rate,
            s.click_to_participate_rate,
            s.overall_conversion_rate,
            s.performance_score,
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        ])
    }

    fn write_user_engagement(
        conn: &Connection,
        e: &UserEngagement,
        on_conflict: OnConflict,
    ) -> rusqlite::Result<usize> {
        let sql = aggregate_insert_sql(
            "user_engagement",
            USER_ENGAGEMENT_KEY,
            USER_ENGAGEMENT_COLUMNS,
            on_conflict,
        );
        conn.prepare_cached(&sql)?.execute(params![
            e.user_id,
            date_key(e.date),
            e.sessions_count,
            e.time_spent,
            e.actions_count,
            e.opportunities_viewed,
            e.opportunities_clicked,
            e.opportunities_participated,
            e.engagement_level.as_str(),
            e.first_activity_at.to_rfc3339(),
            e.last_activity_at.to_rfc3339(),
        ])
    }
}

// ============================================
// Raw actions
// ============================================

impl ActionStore for Database {
    fn insert_action(&self, action: &UserAction) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_actions (user_id, action_type, opportunity_id, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                action.user_id,
                action.action_type.as_str(),
                action.opportunity_id,
                action.metadata.to_string(),
                action.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_actions(
        &self,
        user_id: UserId,
        action_type: &ActionType,
        opportunity_id: Option<OpportunityId>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM user_actions
            WHERE user_id = ?1 AND action_type = ?2 AND opportunity_id IS ?3
            "#,
            params![user_id, action_type.as_str(), opportunity_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ============================================
// Collaborator lookups
// ============================================

impl UserDirectory for Database {
    fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE id = ?",
            [user_id],
            Self::row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn count_users_registered_on(&self, date: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE substr(created_at, 1, 10) = ?",
            [date_key(date)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl OpportunityCatalog for Database {
    fn count_active_opportunities(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM opportunities WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ============================================
// UserAnalytics
// ============================================

impl UserAnalyticsStore for Database {
    fn get_user_analytics(&self, user_id: UserId) -> Result<Option<UserAnalytics>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM user_analytics WHERE user_id = ?",
            [user_id],
            Self::row_to_user_analytics,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_user_analytics(&self, analytics: &UserAnalytics) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_user_analytics(&conn, analytics, OnConflict::Fail)?;
        Ok(())
    }

    fn get_or_create_user_analytics(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserAnalytics> {
        let conn = self.conn.lock().unwrap();
        let fresh = UserAnalytics::new(user_id, now);
        Self::write_user_analytics(&conn, &fresh, OnConflict::Ignore)?;
        conn.query_row(
            "SELECT * FROM user_analytics WHERE user_id = ?",
            [user_id],
            Self::row_to_user_analytics,
        )
        .map_err(Error::from)
    }

    fn update_user_analytics(&self, analytics: &UserAnalytics) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_user_analytics(&conn, analytics, OnConflict::Replace)?;
        Ok(())
    }

    fn top_users(&self, order: TopUsersOrder, limit: usize) -> Result<Vec<UserAnalytics>> {
        let order_by = match order {
            TopUsersOrder::Viewed => "viewed_opportunities DESC",
            TopUsersOrder::Participated => "participated_opportunities DESC",
            TopUsersOrder::Conversion => "overall_conversion_rate DESC, viewed_opportunities DESC",
            TopUsersOrder::Engagement => "total_sessions DESC, total_time_spent DESC",
        };
        let sql = format!(
            "SELECT * FROM user_analytics ORDER BY {}, user_id ASC LIMIT ?",
            order_by
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit as i64], Self::row_to_user_analytics)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ============================================
// DailyStats
// ============================================

impl DailyStatsStore for Database {
    fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM daily_stats WHERE date = ?",
            [date_key(date)],
            Self::row_to_daily_stats,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_daily_stats(&conn, stats, OnConflict::Fail)?;
        Ok(())
    }

    fn get_or_create_daily_stats(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DailyStats> {
        let conn = self.conn.lock().unwrap();
        let fresh = DailyStats::new(date, now);
        Self::write_daily_stats(&conn, &fresh, OnConflict::Ignore)?;
        conn.query_row(
            "SELECT * FROM daily_stats WHERE date = ?",
            [date_key(date)],
            Self::row_to_daily_stats,
        )
        .map_err(Error::from)
    }

    fn update_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_daily_stats(&conn, stats, OnConflict::Replace)?;
        Ok(())
    }

    fn daily_stats_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM daily_stats WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )?;
        let rows = stmt
            .query_map(params![date_key(from), date_key(to)], Self::row_to_daily_stats)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ============================================
// OpportunityStats
// ============================================

impl OpportunityStatsStore for Database {
    fn get_opportunity_stats(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<Option<OpportunityStats>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM opportunity_stats WHERE opportunity_id = ?",
            [opportunity_id],
            Self::row_to_opportunity_stats,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_opportunity_stats(&self, stats: &OpportunityStats) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_opportunity_stats(&conn, stats, OnConflict::Fail)?;
        Ok(())
    }

    fn get_or_create_opportunity_stats(
        &self,
        opportunity_id: OpportunityId,
        now: DateTime<Utc>,
    ) -> Result<OpportunityStats> {
        let conn = self.conn.lock().unwrap();
        let fresh = OpportunityStats::new(opportunity_id, now);
        Self::write_opportunity_stats(&conn, &fresh, OnConflict::Ignore)?;
        conn.query_row(
            "SELECT * FROM opportunity_stats WHERE opportunity_id = ?",
            [opportunity_id],
            Self::row_to_opportunity_stats,
        )
        .map_err(Error::from)
    }

    fn update_opportunity_stats(&self, stats: &OpportunityStats) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_opportunity_stats(&conn, stats, OnConflict::Replace)?;
        Ok(())
    }

    fn top_opportunities(&self, limit: usize) -> Result<Vec<OpportunityStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM opportunity_stats
            ORDER BY performance_score DESC, unique_views DESC, opportunity_id ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt
            .query_map([limit as i64], Self::row_to_opportunity_stats)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ============================================
// UserEngagement
// ============================================

impl UserEngagementStore for Database {
    fn get_user_engagement(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<UserEngagement>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM user_engagement WHERE user_id = ?1 AND date = ?2",
            params![user_id, date_key(date)],
            Self::row_to_user_engagement,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_user_engagement(&self, engagement: &UserEngagement) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_user_engagement(&conn, engagement, OnConflict::Fail)?;
        Ok(())
    }

    fn get_or_create_user_engagement(
        &self,
        user_id: UserId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UserEngagement> {
        let conn = self.conn.lock().unwrap();
        let fresh = UserEngagement::new(user_id, date, now);
        Self::write_user_engagement(&conn, &fresh, OnConflict::Ignore)?;
        conn.query_row(
            "SELECT * FROM user_engagement WHERE user_id = ?1 AND date = ?2",
            params![user_id, date_key(date)],
            Self::row_to_user_engagement,
        )
        .map_err(Error::from)
    }

    fn update_user_engagement(&self, engagement: &UserEngagement) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_user_engagement(&conn, engagement, OnConflict::Replace)?;
        Ok(())
    }

    fn engagement_history(
        &self,
        user_id: UserId,
        since: NaiveDate,
    ) -> Result<Vec<UserEngagement>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM user_engagement WHERE user_id = ?1 AND date >= ?2 ORDER BY date DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id, date_key(since)], Self::row_to_user_engagement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_engaged_users(&self, date: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM user_engagement WHERE date = ?",
            [date_key(date)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_user_analytics_crud() {
        let db = test_db();
        let now = noon(2026, 3, 1);

        assert!(db.get_user_analytics(7).unwrap().is_none());

        let mut analytics = db.get_or_create_user_analytics(7, now).unwrap();
        assert_eq!(analytics, UserAnalytics::new(7, now));

        analytics.viewed_opportunities = 4;
        analytics.last_activity_at = Some(now);
        analytics.refresh_derived();
        db.update_user_analytics(&analytics).unwrap();

        let retrieved = db.get_user_analytics(7).unwrap().unwrap();
        assert_eq!(retrieved, analytics);

        // get_or_create on an existing key returns the stored row untouched
        let again = db
            .get_or_create_user_analytics(7, now + Duration::hours(1))
            .unwrap();
        assert_eq!(again.viewed_opportunities, 4);
        assert_eq!(again.created_at, now);
    }

    #[test]
    fn test_create_rejects_duplicate_key() {
        let db = test_db();
        let now = noon(2026, 3, 1);
        let stats = OpportunityStats::new(11, now);

        db.create_opportunity_stats(&stats).unwrap();
        assert!(matches!(
            db.create_opportunity_stats(&stats),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_update_keeps_created_at() {
        let db = test_db();
        let created = noon(2026, 3, 1);
        let stats = db
            .get_or_create_daily_stats(created.date_naive(), created)
            .unwrap();

        let mut changed = stats.clone();
        changed.created_at = created + Duration::days(3);
        changed.opportunities_viewed = 9;
        db.update_daily_stats(&changed).unwrap();

        let retrieved = db.get_daily_stats(created.date_naive()).unwrap().unwrap();
        assert_eq!(retrieved.opportunities_viewed, 9);
        assert_eq!(retrieved.created_at, created);
    }

    #[test]
    fn test_count_actions_by_triple() {
        let db = test_db();
        let now = noon(2026, 3, 1);
        let action = |action_type: &str, opportunity_id: Option<i64>| UserAction {
            id: 0,
            user_id: 1,
            action_type: ActionType::parse(action_type),
            opportunity_id,
            metadata: serde_json::json!({}),
            created_at: now,
        };

        db.insert_action(&action("viewed", Some(5))).unwrap();
        db.insert_action(&action("viewed", Some(5))).unwrap();
        db.insert_action(&action("viewed", Some(6))).unwrap();
        db.insert_action(&action("clicked", Some(5))).unwrap();
        db.insert_action(&action("viewed", None)).unwrap();

        assert_eq!(db.count_actions(1, &ActionType::Viewed, Some(5)).unwrap(), 2);
        assert_eq!(db.count_actions(1, &ActionType::Viewed, Some(6)).unwrap(), 1);
        assert_eq!(db.count_actions(1, &ActionType::Clicked, Some(5)).unwrap(), 1);
        assert_eq!(db.count_actions(1, &ActionType::Viewed, None).unwrap(), 1);
        assert_eq!(db.count_actions(2, &ActionType::Viewed, Some(5)).unwrap(), 0);
    }

    #[test]
    fn test_daily_stats_range_is_inclusive_and_ordered() {
        let db = test_db();
        for day in 1..=5 {
            let now = noon(2026, 3, day);
            db.get_or_create_daily_stats(now.date_naive(), now).unwrap();
        }

        let from = noon(2026, 3, 2).date_naive();
        let to = noon(2026, 3, 4).date_naive();
        let range = db.daily_stats_range(from, to).unwrap();

        let dates: Vec<_> = range.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![from, noon(2026, 3, 3).date_naive(), to]);
    }

    #[test]
    fn test_top_users_ordering() {
        let db = test_db();
        let now = noon(2026, 3, 1);

        for (user_id, viewed, participated, sessions) in
            [(1, 10, 1, 5), (2, 30, 3, 1), (3, 20, 10, 9)]
        {
            let mut a = UserAnalytics::new(user_id, now);
            a.viewed_opportunities = viewed;
            a.clicked_opportunities = participated;
            a.participated_opportunities = participated;
            a.total_sessions = sessions;
            a.refresh_derived();
            db.create_user_analytics(&a).unwrap();
        }

        let ids = |order| -> Vec<i64> {
            db.top_users(order, 10)
                .unwrap()
                .iter()
                .map(|a| a.user_id)
                .collect()
        };

        assert_eq!(ids(TopUsersOrder::Viewed), vec![2, 3, 1]);
        assert_eq!(ids(TopUsersOrder::Participated), vec![3, 2, 1]);
        assert_eq!(ids(TopUsersOrder::Conversion), vec![3, 2, 1]);
        assert_eq!(ids(TopUsersOrder::Engagement), vec![3, 1, 2]);
        assert_eq!(db.top_users(TopUsersOrder::Viewed, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_engagement_history_and_counts() {
        let db = test_db();
        for day in 1..=4 {
            let now = noon(2026, 3, day);
            let mut e = db
                .get_or_create_user_engagement(1, now.date_naive(), now)
                .unwrap();
            e.actions_count = day as i64;
            e.engagement_level = EngagementLevel::Medium;
            db.update_user_engagement(&e).unwrap();
        }
        let now = noon(2026, 3, 4);
        db.get_or_create_user_engagement(2, now.date_naive(), now)
            .unwrap();

        let history = db
            .engagement_history(1, noon(2026, 3, 3).date_naive())
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, noon(2026, 3, 4).date_naive());
        assert_eq!(history[0].engagement_level, EngagementLevel::Medium);

        assert_eq!(db.count_engaged_users(now.date_naive()).unwrap(), 2);
        assert_eq!(
            db.count_engaged_users(noon(2026, 3, 1).date_naive()).unwrap(),
            1
        );
    }

    #[test]
    fn test_source_of_truth_lookups() {
        let db = test_db();
        let now = noon(2026, 3, 1);

        db.upsert_user(&User {
            id: 1,
            created_at: now,
            is_premium: true,
        })
        .unwrap();
        db.upsert_user(&User {
            id: 2,
            created_at: now - Duration::days(1),
            is_premium: false,
        })
        .unwrap();

        let user = db.get_user_by_id(1).unwrap().unwrap();
        assert!(user.is_premium);
        assert!(db.get_user_by_id(99).unwrap().is_none());
        assert_eq!(db.count_users_registered_on(now.date_naive()).unwrap(), 1);

        for (id, active) in [(1, true), (2, true), (3, false)] {
            db.upsert_opportunity(&Opportunity {
                id,
                title: format!("Opportunity {id}"),
                is_active: active,
                created_at: now,
            })
            .unwrap();
        }
        assert_eq!(db.count_active_opportunities().unwrap(), 2);
        assert_eq!(db.get_opportunity(3).unwrap().unwrap().title, "Opportunity 3");
    }
}
