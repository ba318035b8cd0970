//! Core domain types for oppstats
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Action** | A raw user interaction with an opportunity (view, click, participation, ignore) |
//! | **Aggregate** | A derived, persisted summary keyed by user, day, opportunity, or user+day |
//! | **Unique counter** | Incremented at most once per (user, action type, opportunity) triple |
//! | **Engagement level** | Low/medium/high classification of one user's activity on one day |
//! | **Performance score** | A 0-100 summary of an opportunity's conversion effectiveness |
//!
//! All day keys are UTC calendar dates.

use crate::analytics::calc;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a platform user.
pub type UserId = i64;

/// Identifier of an opportunity.
pub type OpportunityId = i64;

// ============================================
// Raw actions
// ============================================

/// Kind of a raw user action.
///
/// Unrecognized kinds are kept verbatim in [`ActionType::Other`] so the raw
/// record preserves them, but they never move an aggregate counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Viewed,
    Clicked,
    Participated,
    Ignored,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Viewed => "viewed",
            ActionType::Clicked => "clicked",
            ActionType::Participated => "participated",
            ActionType::Ignored => "ignored",
            ActionType::Other(s) => s,
        }
    }

    /// Parse an action type; never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "viewed" => ActionType::Viewed,
            "clicked" => ActionType::Clicked,
            "participated" => ActionType::Participated,
            "ignored" => ActionType::Ignored,
            other => ActionType::Other(other.to_string()),
        }
    }

    /// Whether this action moves aggregate counters.
    pub fn is_counted(&self) -> bool {
        !matches!(self, ActionType::Other(_))
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        ActionType::parse(s)
    }
}

impl Serialize for ActionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ActionType::parse(&s))
    }
}

/// A raw action record, persisted before any aggregate is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAction {
    /// Row id (0 until inserted)
    pub id: i64,
    pub user_id: UserId,
    pub action_type: ActionType,
    pub opportunity_id: Option<OpportunityId>,
    /// Opaque key/value map supplied by the caller
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Source-of-truth collaborators
// ============================================

/// The slice of a platform user the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub is_premium: bool,
}

/// The slice of an opportunity the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Aggregates
// ============================================

/// Lifetime analytics for a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub user_id: UserId,

    pub viewed_opportunities: i64,
    pub clicked_opportunities: i64,
    pub participated_opportunities: i64,
    pub ignored_opportunities: i64,

    pub total_sessions: i64,
    /// Seconds
    pub total_time_spent: i64,
    /// Seconds, `total_time_spent / total_sessions`
    pub average_session_time: f64,

    pub notifications_received: i64,
    pub notifications_opened: i64,

    pub total_revenue: f64,
    pub days_since_registration: i64,

    /// Percent, 0-100
    pub view_to_click_rate: f64,
    /// Percent, 0-100
    pub click_to_participate_rate: f64,
    /// Percent, 0-100
    pub overall_conversion_rate: f64,

    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAnalytics {
    /// A zero-valued record for `user_id`.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            viewed_opportunities: 0,
            clicked_opportunities: 0,
            participated_opportunities: 0,
            ignored_opportunities: 0,
            total_sessions: 0,
            total_time_spent: 0,
            average_session_time: 0.0,
            notifications_received: 0,
            notifications_opened: 0,
            total_revenue: 0.0,
            days_since_registration: 0,
            view_to_click_rate: 0.0,
            click_to_participate_rate: 0.0,
            overall_conversion_rate: 0.0,
            last_activity_at: None,
            last_payment_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-derive rates and the average session time from the counters.
    pub fn refresh_derived(&mut self) {
        let rates = calc::conversion_rates(
            self.viewed_opportunities,
            self.clicked_opportunities,
            self.participated_opportunities,
        );
        self.view_to_click_rate = rates.view_to_click;
        self.click_to_participate_rate = rates.click_to_participate;
        self.overall_conversion_rate = rates.overall;
        self.average_session_time = calc::average(self.total_time_spent, self.total_sessions);
    }
}

/// Platform-wide statistics for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,

    pub opportunities_viewed: i64,
    pub opportunities_clicked: i64,
    pub opportunities_participated: i64,

    pub total_sessions: i64,
    /// Seconds, maintained incrementally
    pub average_session_time: f64,

    pub active_users: i64,
    pub new_users: i64,
    /// Snapshot of active opportunities, refreshed by the daily recompute
    pub total_opportunities: i64,

    pub notifications_sent: i64,
    pub notifications_failed: i64,
    pub notifications_opened: i64,

    pub daily_revenue: f64,
    pub new_subscriptions: i64,

    /// Percent, participated / viewed
    pub conversion_rate: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyStats {
    pub fn new(date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            date,
            opportunities_viewed: 0,
            opportunities_clicked: 0,
            opportunities_participated: 0,
            total_sessions: 0,
            average_session_time: 0.0,
            active_users: 0,
            new_users: 0,
            total_opportunities: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            notifications_opened: 0,
            daily_revenue: 0.0,
            new_subscriptions: 0,
            conversion_rate: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn refresh_derived(&mut self) {
        self.conversion_rate =
            calc::percentage(self.opportunities_participated, self.opportunities_viewed);
    }

    /// Count one session and fold its duration into the running average.
    pub fn add_session(&mut self, duration_secs: i64) {
        self.total_sessions += 1;
        self.average_session_time = calc::running_average(
            self.average_session_time,
            self.total_sessions,
            duration_secs,
        );
    }
}

/// Lifetime performance of one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityStats {
    pub opportunity_id: OpportunityId,

    pub total_views: i64,
    pub unique_views: i64,
    pub total_clicks: i64,
    pub unique_clicks: i64,
    pub total_participations: i64,
    pub unique_participations: i64,
    pub total_ignores: i64,
    pub unique_ignores: i64,

    pub premium_user_views: i64,
    pub free_user_views: i64,

    /// Percent over unique counters
    pub view_to_click_rate: f64,
    /// Percent over unique counters
    pub click_to_participate_rate: f64,
    /// Percent over unique counters
    pub overall_conversion_rate: f64,
    /// 0-100
    pub performance_score: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpportunityStats {
    pub fn new(opportunity_id: OpportunityId, now: DateTime<Utc>) -> Self {
        Self {
            opportunity_id,
            total_views: 0,
            unique_views: 0,
            total_clicks: 0,
            unique_clicks: 0,
            total_participations: 0,
            unique_participations: 0,
            total_ignores: 0,
            unique_ignores: 0,
            premium_user_views: 0,
            free_user_views: 0,
            view_to_click_rate: 0.0,
            click_to_participate_rate: 0.0,
            overall_conversion_rate: 0.0,
            performance_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn refresh_derived(&mut self) {
        let rates = calc::conversion_rates(
            self.unique_views,
            self.unique_clicks,
            self.unique_participations,
        );
        self.view_to_click_rate = rates.view_to_click;
        self.click_to_participate_rate = rates.click_to_participate;
        self.overall_conversion_rate = rates.overall;
        self.performance_score = calc::performance_score(
            self.unique_views,
            self.unique_clicks,
            self.unique_participations,
        );
    }
}

/// Activity intensity of one user on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }
}

impl std::str::FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(EngagementLevel::Low),
            "medium" => Ok(EngagementLevel::Medium),
            "high" => Ok(EngagementLevel::High),
            _ => Err(format!("unknown engagement level: {}", s)),
        }
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user, per-day engagement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEngagement {
    pub user_id: UserId,
    pub date: NaiveDate,

    pub sessions_count: i64,
    /// Seconds
    pub time_spent: i64,
    pub actions_count: i64,

    pub opportunities_viewed: i64,
    pub opportunities_clicked: i64,
    pub opportunities_participated: i64,

    pub engagement_level: EngagementLevel,

    /// Set when the record is created, never moved afterwards
    pub first_activity_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UserEngagement {
    pub fn new(user_id: UserId, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            date,
            sessions_count: 0,
            time_spent: 0,
            actions_count: 0,
            opportunities_viewed: 0,
            opportunities_clicked: 0,
            opportunities_participated: 0,
            engagement_level: EngagementLevel::Low,
            first_activity_at: now,
            last_activity_at: now,
        }
    }

    pub fn refresh_derived(&mut self) {
        self.engagement_level =
            calc::engagement_level(self.sessions_count, self.time_spent, self.actions_count);
    }
}

// ============================================
// Read-side options
// ============================================

/// Ordering for top-user queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopUsersOrder {
    /// Most opportunities viewed
    Viewed,
    /// Most opportunities participated in
    Participated,
    /// Highest overall conversion rate
    Conversion,
    /// Most sessions, then most time spent
    Engagement,
}

impl TopUsersOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopUsersOrder::Viewed => "viewed",
            TopUsersOrder::Participated => "participated",
            TopUsersOrder::Conversion => "conversion",
            TopUsersOrder::Engagement => "engagement",
        }
    }
}

impl std::str::FromStr for TopUsersOrder {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed" => Ok(TopUsersOrder::Viewed),
            "participated" => Ok(TopUsersOrder::Participated),
            "conversion" => Ok(TopUsersOrder::Conversion),
            "engagement" => Ok(TopUsersOrder::Engagement),
            other => Err(crate::error::Error::UnknownOrdering(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parse_roundtrip() {
        for s in ["viewed", "clicked", "participated", "ignored"] {
            let action = ActionType::parse(s);
            assert!(action.is_counted());
            assert_eq!(action.as_str(), s);
        }

        let other = ActionType::parse("shared");
        assert_eq!(other, ActionType::Other("shared".to_string()));
        assert!(!other.is_counted());
        assert_eq!(other.as_str(), "shared");
    }

    #[test]
    fn test_top_users_order_from_str() {
        assert_eq!(
            "conversion".parse::<TopUsersOrder>().unwrap(),
            TopUsersOrder::Conversion
        );
        assert!(matches!(
            "revenue".parse::<TopUsersOrder>(),
            Err(crate::error::Error::UnknownOrdering(_))
        ));
    }

    #[test]
    fn test_daily_stats_running_average() {
        let now = Utc::now();
        let mut stats = DailyStats::new(now.date_naive(), now);

        stats.add_session(100);
        assert_eq!(stats.average_session_time, 100.0);

        stats.add_session(300);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.average_session_time, 200.0);
    }

    #[test]
    fn test_engagement_level_serializes_lowercase() {
        let json = serde_json::to_string(&EngagementLevel::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        assert_eq!("high".parse::<EngagementLevel>(), Ok(EngagementLevel::High));
    }
}
