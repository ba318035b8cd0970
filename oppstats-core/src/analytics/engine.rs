//! Event ingestion pipeline
//!
//! [`MetricsEngine`] is the single write path into the aggregates. Each
//! public recorder fans one event out to the aggregates it touches:
//!
//! ```text
//!                 ┌──────────────────────┐
//!   track_action ─┤ 0. raw action log     │  (failure here touches nothing)
//!                 ├──────────────────────┤
//!                 │ a. user analytics     │
//!                 │ b. daily stats        │
//!                 │ c. opportunity stats  │  (only with an opportunity id)
//!                 │ d. user engagement    │
//!                 └──────────────────────┘
//! ```
//!
//! Every step is its own get-or-create, mutate, update sequence against the
//! store. The first failing step aborts the rest and its error is returned;
//! earlier steps stay applied. Readers must tolerate that partial state.
//!
//! Steps are read-modify-write with no lock held between the read and the
//! write, so two concurrent events on the same key can lose an increment.
//! The same holds for the first-occurrence check behind unique counters.

use crate::config::MetricsConfig;
use crate::error::{Error, Result};
use crate::store::MetricsStore;
use crate::types::{
    ActionType, DailyStats, OpportunityId, OpportunityStats, TopUsersOrder, User, UserAction,
    UserAnalytics, UserEngagement, UserId,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Source of the current time.
///
/// Day keys are derived from it, so tests swap it to cross a UTC midnight.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Real-time metrics aggregation engine.
pub struct MetricsEngine<S> {
    store: S,
    clock: Box<dyn Clock>,
    config: MetricsConfig,
}

/// Log a failed storage step before handing the error back.
fn storage_failure(step: &'static str, user_id: UserId, err: Error) -> Error {
    tracing::error!(step, user_id, error = %err, "Metrics update failed");
    err
}

/// Add a session duration to a running time total.
///
/// Overflow is the caller's fault (absurd durations), so it is rejected
/// before anything is written.
fn add_time_spent(total: i64, duration_secs: i64, user_id: UserId) -> Result<i64> {
    total.checked_add(duration_secs).ok_or_else(|| {
        Error::InvalidInput(format!(
            "session duration {} overflows time spent for user {}",
            duration_secs, user_id
        ))
    })
}

/// First day of a `days`-long window ending on `today` (today included).
///
/// Windows reaching past the earliest representable date start there.
pub(crate) fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(days.max(1)) - 1))
        .unwrap_or(NaiveDate::MIN)
}

fn validate_user_id(user_id: UserId) -> Result<()> {
    if user_id <= 0 {
        return Err(Error::InvalidInput(format!(
            "user_id must be positive, got {}",
            user_id
        )));
    }
    Ok(())
}

impl<S: MetricsStore> MetricsEngine<S> {
    /// Create an engine with default configuration and the system clock.
    pub fn new(store: S) -> Self {
        Self::with_config(store, MetricsConfig::default())
    }

    pub fn with_config(store: S, config: MetricsConfig) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            config,
        }
    }

    /// Replace the clock (builder style).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    // ============================================
    // Auxiliary lookups (failures tolerated)
    // ============================================

    /// Look up a user for an enrichment step.
    ///
    /// Lookup errors are logged and swallowed: enrichment is skipped, the
    /// primary update goes ahead.
    fn lookup_user(&self, user_id: UserId, purpose: &'static str) -> Option<User> {
        match self.store.get_user_by_id(user_id) {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::debug!(user_id, purpose, "User not found, skipping enrichment");
                None
            }
            Err(e) => {
                tracing::warn!(user_id, purpose, error = %e, "User lookup failed, skipping enrichment");
                None
            }
        }
    }

    fn refresh_registration_age(&self, analytics: &mut UserAnalytics, now: DateTime<Utc>) {
        if let Some(user) = self.lookup_user(analytics.user_id, "registration_age") {
            analytics.days_since_registration = (now - user.created_at).num_days().max(0);
        }
    }

    // ============================================
    // TrackAction
    // ============================================

    /// Record a raw user action and fold it into all four aggregates.
    ///
    /// `metadata`, when given, must be a JSON object; it is stored on the raw
    /// record only. Unrecognized action types are logged but move no counter.
    pub fn track_action(
        &self,
        user_id: UserId,
        action_type: impl Into<ActionType>,
        opportunity_id: Option<OpportunityId>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        validate_user_id(user_id)?;
        let metadata = match metadata {
            None => serde_json::json!({}),
            Some(value @ serde_json::Value::Object(_)) => value,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "action metadata must be a JSON object, got {}",
                    other
                )))
            }
        };

        let now = self.now();
        let action = UserAction {
            id: 0,
            user_id,
            action_type: action_type.into(),
            opportunity_id,
            metadata,
            created_at: now,
        };

        self.store
            .insert_action(&action)
            .map_err(|e| storage_failure("insert_action", user_id, e))?;

        if !action.action_type.is_counted() {
            tracing::debug!(
                user_id,
                action_type = %action.action_type,
                "Unrecognized action type recorded without counting"
            );
        }

        self.apply_action_to_user(&action)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;
        self.apply_action_to_day(&action)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;
        if let Some(opportunity_id) = action.opportunity_id {
            self.apply_action_to_opportunity(&action, opportunity_id)
                .map_err(|e| storage_failure("opportunity_stats", user_id, e))?;
        }
        self.apply_action_to_engagement(&action)
            .map_err(|e| storage_failure("user_engagement", user_id, e))?;

        tracing::debug!(
            user_id,
            action_type = %action.action_type,
            opportunity_id = ?action.opportunity_id,
            "Tracked action"
        );
        Ok(())
    }

    fn apply_action_to_user(&self, action: &UserAction) -> Result<()> {
        let now = action.created_at;
        let mut analytics = self
            .store
            .get_or_create_user_analytics(action.user_id, now)?;

        match action.action_type {
            ActionType::Viewed => analytics.viewed_opportunities += 1,
            ActionType::Clicked => analytics.clicked_opportunities += 1,
            ActionType::Participated => analytics.participated_opportunities += 1,
            ActionType::Ignored => analytics.ignored_opportunities += 1,
            ActionType::Other(_) => {}
        }

        analytics.last_activity_at = Some(now);
        self.refresh_registration_age(&mut analytics, now);
        analytics.refresh_derived();
        analytics.updated_at = now;
        self.store.update_user_analytics(&analytics)
    }

    fn apply_action_to_day(&self, action: &UserAction) -> Result<()> {
        let now = action.created_at;
        let mut stats = self.store.get_or_create_daily_stats(now.date_naive(), now)?;

        match action.action_type {
            ActionType::Viewed => stats.opportunities_viewed += 1,
            ActionType::Clicked => stats.opportunities_clicked += 1,
            ActionType::Participated => stats.opportunities_participated += 1,
            ActionType::Ignored | ActionType::Other(_) => {}
        }

        stats.refresh_derived();
        stats.updated_at = now;
        self.store.update_daily_stats(&stats)
    }

    fn apply_action_to_opportunity(
        &self,
        action: &UserAction,
        opportunity_id: OpportunityId,
    ) -> Result<()> {
        let now = action.created_at;
        let mut stats = self
            .store
            .get_or_create_opportunity_stats(opportunity_id, now)?;

        if action.action_type.is_counted() {
            // The raw action is already logged, so a count of 1 means this is it.
            let first_time = self.store.count_actions(
                action.user_id,
                &action.action_type,
                Some(opportunity_id),
            )? == 1;
            apply_opportunity_counters(&mut stats, &action.action_type, first_time);
        }

        if action.action_type == ActionType::Viewed {
            if let Some(user) = self.lookup_user(action.user_id, "premium_split") {
                if user.is_premium {
                    stats.premium_user_views += 1;
                } else {
                    stats.free_user_views += 1;
                }
            }
        }

        stats.refresh_derived();
        stats.updated_at = now;
        self.store.update_opportunity_stats(&stats)
    }

    fn apply_action_to_engagement(&self, action: &UserAction) -> Result<()> {
        let now = action.created_at;
        let mut engagement =
            self.store
                .get_or_create_user_engagement(action.user_id, now.date_naive(), now)?;

        if action.action_type.is_counted() {
            engagement.actions_count += 1;
        }
        match action.action_type {
            ActionType::Viewed => engagement.opportunities_viewed += 1,
            ActionType::Clicked => engagement.opportunities_clicked += 1,
            ActionType::Participated => engagement.opportunities_participated += 1,
            ActionType::Ignored | ActionType::Other(_) => {}
        }

        engagement.last_activity_at = now;
        engagement.refresh_derived();
        self.store.update_user_engagement(&engagement)
    }

    // ============================================
    // Narrow recorders
    // ============================================

    /// Record a finished session of `duration_secs` seconds.
    pub fn record_session(&self, user_id: UserId, duration_secs: i64) -> Result<()> {
        validate_user_id(user_id)?;
        if duration_secs <= 0 {
            return Err(Error::InvalidInput(format!(
                "session duration must be positive, got {}",
                duration_secs
            )));
        }
        let now = self.now();

        self.session_to_user(user_id, duration_secs, now)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;
        self.session_to_day(duration_secs, now)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;
        self.session_to_engagement(user_id, duration_secs, now)
            .map_err(|e| storage_failure("user_engagement", user_id, e))?;

        tracing::debug!(user_id, duration_secs, "Recorded session");
        Ok(())
    }

    fn session_to_user(
        &self,
        user_id: UserId,
        duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut analytics = self.store.get_or_create_user_analytics(user_id, now)?;
        analytics.total_time_spent =
            add_time_spent(analytics.total_time_spent, duration_secs, user_id)?;
        analytics.total_sessions += 1;
        analytics.last_activity_at = Some(now);
        self.refresh_registration_age(&mut analytics, now);
        analytics.refresh_derived();
        analytics.updated_at = now;
        self.store.update_user_analytics(&analytics)
    }

    fn session_to_day(&self, duration_secs: i64, now: DateTime<Utc>) -> Result<()> {
        let mut stats = self.store.get_or_create_daily_stats(now.date_naive(), now)?;
        stats.add_session(duration_secs);
        stats.updated_at = now;
        self.store.update_daily_stats(&stats)
    }

    fn session_to_engagement(
        &self,
        user_id: UserId,
        duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut engagement =
            self.store
                .get_or_create_user_engagement(user_id, now.date_naive(), now)?;
        engagement.time_spent = add_time_spent(engagement.time_spent, duration_secs, user_id)?;
        engagement.sessions_count += 1;
        engagement.last_activity_at = now;
        engagement.refresh_derived();
        self.store.update_user_engagement(&engagement)
    }

    /// Record the delivery outcome of one notification to `user_id`.
    pub fn record_notification(&self, user_id: UserId, success: bool, opened: bool) -> Result<()> {
        validate_user_id(user_id)?;
        let now = self.now();

        let mut analytics = self
            .store
            .get_or_create_user_analytics(user_id, now)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;
        analytics.notifications_received += 1;
        if opened {
            analytics.notifications_opened += 1;
        }
        self.refresh_registration_age(&mut analytics, now);
        analytics.updated_at = now;
        self.store
            .update_user_analytics(&analytics)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;

        let mut stats = self
            .store
            .get_or_create_daily_stats(now.date_naive(), now)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;
        if success {
            stats.notifications_sent += 1;
        } else {
            stats.notifications_failed += 1;
        }
        if opened {
            stats.notifications_opened += 1;
        }
        stats.updated_at = now;
        self.store
            .update_daily_stats(&stats)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;

        tracing::debug!(user_id, success, opened, "Recorded notification");
        Ok(())
    }

    /// Record a payment. Every call counts as one new subscription.
    pub fn record_payment(&self, user_id: UserId, amount: f64) -> Result<()> {
        validate_user_id(user_id)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "payment amount must be a positive number, got {}",
                amount
            )));
        }
        let now = self.now();

        let mut analytics = self
            .store
            .get_or_create_user_analytics(user_id, now)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;
        analytics.total_revenue += amount;
        analytics.last_payment_at = Some(now);
        self.refresh_registration_age(&mut analytics, now);
        analytics.updated_at = now;
        self.store
            .update_user_analytics(&analytics)
            .map_err(|e| storage_failure("user_analytics", user_id, e))?;

        let mut stats = self
            .store
            .get_or_create_daily_stats(now.date_naive(), now)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;
        stats.daily_revenue += amount;
        stats.new_subscriptions += 1;
        stats.updated_at = now;
        self.store
            .update_daily_stats(&stats)
            .map_err(|e| storage_failure("daily_stats", user_id, e))?;

        tracing::info!(user_id, amount, "Recorded payment");
        Ok(())
    }

    // ============================================
    // Read accessors
    // ============================================

    /// Lifetime analytics for a user, `None` if the user has no events yet.
    pub fn get_user_analytics(&self, user_id: UserId) -> Result<Option<UserAnalytics>> {
        self.store.get_user_analytics(user_id)
    }

    /// The user's engagement records for the last `days` days (today
    /// included), newest first. `days = 0` uses the configured default.
    pub fn get_user_engagement_history(
        &self,
        user_id: UserId,
        days: u32,
    ) -> Result<Vec<UserEngagement>> {
        let days = if days == 0 {
            self.config.default_history_days
        } else {
            days
        };
        self.store
            .engagement_history(user_id, window_start(self.today(), days))
    }

    /// Daily stats with `from <= date <= to`, oldest first.
    pub fn get_daily_stats_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStats>> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "date range is reversed: {} > {}",
                from, to
            )));
        }
        self.store.daily_stats_range(from, to)
    }

    /// Best-performing opportunities by performance score.
    pub fn get_top_opportunities(&self, limit: usize) -> Result<Vec<OpportunityStats>> {
        self.store
            .top_opportunities(self.config.resolve_top_limit(limit))
    }

    pub fn get_top_users(&self, limit: usize, order: TopUsersOrder) -> Result<Vec<UserAnalytics>> {
        self.store
            .top_users(order, self.config.resolve_top_limit(limit))
    }
}

/// Bump the total counter for `action_type`, and the unique one on a
/// first occurrence.
fn apply_opportunity_counters(
    stats: &mut OpportunityStats,
    action_type: &ActionType,
    first_time: bool,
) {
    let (total, unique) = match action_type {
        ActionType::Viewed => (&mut stats.total_views, &mut stats.unique_views),
        ActionType::Clicked => (&mut stats.total_clicks, &mut stats.unique_clicks),
        ActionType::Participated => (
            &mut stats.total_participations,
            &mut stats.unique_participations,
        ),
        ActionType::Ignored => (&mut stats.total_ignores, &mut stats.unique_ignores),
        ActionType::Other(_) => return,
    };
    *total += 1;
    if first_time {
        *unique += 1;
    }
}
