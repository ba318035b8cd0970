//! Platform summary: today's stats plus a trailing-window rollup.

use super::calc;
use super::engine::{window_start, MetricsEngine};
use crate::error::Result;
use crate::store::MetricsStore;
use crate::types::DailyStats;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Platform-wide summary.
///
/// The window covers `window_days` days ending today (today included).
/// Window totals only see days that have a record.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformSummary {
    pub generated_at: DateTime<Utc>,
    /// Today's record, `None` before anything happened today
    pub today: Option<DailyStats>,

    pub window_start: NaiveDate,
    pub window_days: u32,
    /// Days inside the window that have a record
    pub days_with_data: usize,

    // Window totals
    /// Sum of each day's active users (a user active on two days counts twice)
    pub window_active_users: i64,
    pub window_new_users: i64,
    pub window_revenue: f64,
    pub window_notifications_sent: i64,

    /// Mean of `active_users` over days with data
    pub average_daily_active_users: f64,
}

impl PlatformSummary {
    /// Fold a window of daily records into a summary.
    pub fn compile(
        generated_at: DateTime<Utc>,
        window_start: NaiveDate,
        window_days: u32,
        window: &[DailyStats],
    ) -> Self {
        let today_date = generated_at.date_naive();
        let today = window.iter().find(|d| d.date == today_date).cloned();

        let window_active_users: i64 = window.iter().map(|d| d.active_users).sum();
        let window_new_users = window.iter().map(|d| d.new_users).sum();
        let window_revenue = window.iter().map(|d| d.daily_revenue).sum();
        let window_notifications_sent = window.iter().map(|d| d.notifications_sent).sum();

        Self {
            generated_at,
            today,
            window_start,
            window_days,
            days_with_data: window.len(),
            window_active_users,
            window_new_users,
            window_revenue,
            window_notifications_sent,
            average_daily_active_users: calc::average(window_active_users, window.len() as i64),
        }
    }
}

impl<S: MetricsStore> MetricsEngine<S> {
    /// Today's stats plus totals over the configured trailing window.
    pub fn get_platform_summary(&self) -> Result<PlatformSummary> {
        let now = self.now();
        let window_days = self.config().summary_window_days.max(1);
        let window_start = window_start(now.date_naive(), window_days);

        let window = self
            .store()
            .daily_stats_range(window_start, now.date_naive())?;

        tracing::debug!(
            window_days,
            days_with_data = window.len(),
            "Compiled platform summary"
        );
        Ok(PlatformSummary::compile(now, window_start, window_days, &window))
    }
}
