//! Store contracts consumed by the metrics engine.
//!
//! The engine never talks to SQLite directly; it goes through these traits so
//! persistence stays a collaborator. [`crate::db::Database`] implements all of
//! them.
//!
//! Every aggregate store offers the same four primitives:
//! - `get`: fetch by key, `None` when absent
//! - `create`: insert a new record, failing if the key exists
//! - `get_or_create`: fetch, inserting a zero-valued record first if absent.
//!   Implementations must make the insert conditional on the key's
//!   uniqueness constraint rather than on a prior read.
//! - `update`: replace the stored record with the given one
//!
//! None of these make a read-modify-write sequence atomic. Two callers that
//! `get_or_create` the same key, mutate, and `update` can lose one of the
//! updates.

use crate::error::Result;
use crate::types::{
    ActionType, DailyStats, OpportunityId, OpportunityStats, TopUsersOrder, User, UserAction,
    UserAnalytics, UserEngagement, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Raw action log.
pub trait ActionStore {
    /// Persist a raw action, returning its row id.
    fn insert_action(&self, action: &UserAction) -> Result<i64>;

    /// Count logged actions for a (user, type, opportunity) triple.
    ///
    /// `opportunity_id = None` matches actions logged without an opportunity.
    fn count_actions(
        &self,
        user_id: UserId,
        action_type: &ActionType,
        opportunity_id: Option<OpportunityId>,
    ) -> Result<i64>;
}

/// Read access to platform users.
pub trait UserDirectory {
    fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>>;

    /// Number of users whose registration falls on `date` (UTC).
    fn count_users_registered_on(&self, date: NaiveDate) -> Result<i64>;
}

/// Read access to the opportunity catalogue.
pub trait OpportunityCatalog {
    fn count_active_opportunities(&self) -> Result<i64>;
}

pub trait UserAnalyticsStore {
    fn get_user_analytics(&self, user_id: UserId) -> Result<Option<UserAnalytics>>;
    fn create_user_analytics(&self, analytics: &UserAnalytics) -> Result<()>;
    fn get_or_create_user_analytics(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserAnalytics>;
    fn update_user_analytics(&self, analytics: &UserAnalytics) -> Result<()>;

    /// Top `limit` users by the given ordering.
    fn top_users(&self, order: TopUsersOrder, limit: usize) -> Result<Vec<UserAnalytics>>;
}

pub trait DailyStatsStore {
    fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>>;
    fn create_daily_stats(&self, stats: &DailyStats) -> Result<()>;
    fn get_or_create_daily_stats(&self, date: NaiveDate, now: DateTime<Utc>)
        -> Result<DailyStats>;
    fn update_daily_stats(&self, stats: &DailyStats) -> Result<()>;

    /// Records with `from <= date <= to`, oldest first.
    fn daily_stats_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStats>>;
}

pub trait OpportunityStatsStore {
    fn get_opportunity_stats(&self, opportunity_id: OpportunityId)
        -> Result<Option<OpportunityStats>>;
    fn create_opportunity_stats(&self, stats: &OpportunityStats) -> Result<()>;
    fn get_or_create_opportunity_stats(
        &self,
        opportunity_id: OpportunityId,
        now: DateTime<Utc>,
    ) -> Result<OpportunityStats>;
    fn update_opportunity_stats(&self, stats: &OpportunityStats) -> Result<()>;

    /// Top `limit` opportunities by performance score.
    fn top_opportunities(&self, limit: usize) -> Result<Vec<OpportunityStats>>;
}

pub trait UserEngagementStore {
    fn get_user_engagement(&self, user_id: UserId, date: NaiveDate)
        -> Result<Option<UserEngagement>>;
    fn create_user_engagement(&self, engagement: &UserEngagement) -> Result<()>;
    fn get_or_create_user_engagement(
        &self,
        user_id: UserId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UserEngagement>;
    fn update_user_engagement(&self, engagement: &UserEngagement) -> Result<()>;

    /// A user's records with `date >= since`, newest first.
    fn engagement_history(&self, user_id: UserId, since: NaiveDate)
        -> Result<Vec<UserEngagement>>;

    /// Number of distinct users with a record on `date`.
    fn count_engaged_users(&self, date: NaiveDate) -> Result<i64>;
}

/// Everything the metrics engine needs from persistence.
pub trait MetricsStore:
    ActionStore
    + UserDirectory
    + OpportunityCatalog
    + UserAnalyticsStore
    + DailyStatsStore
    + OpportunityStatsStore
    + UserEngagementStore
{
}

impl<T> MetricsStore for T where
    T: ActionStore
        + UserDirectory
        + OpportunityCatalog
        + UserAnalyticsStore
        + DailyStatsStore
        + OpportunityStatsStore
        + UserEngagementStore
{
}
