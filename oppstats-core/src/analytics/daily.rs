//! Daily recompute of platform-level snapshot fields.
//!
//! Counters on today's [`DailyStats`] are maintained incrementally by the
//! engine. A few fields are snapshots of other tables and are refreshed here
//! instead:
//!
//! - `total_opportunities`: opportunities currently active
//! - `active_users`: users with an engagement record today
//! - `new_users`: users who registered today
//!
//! Each run overwrites those fields, so running it any number of times in a
//! day converges on the same record.

use super::engine::MetricsEngine;
use crate::error::Result;
use crate::store::MetricsStore;
use crate::types::DailyStats;

/// What started a daily recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyTrigger {
    /// The external daily scheduler
    Scheduled,
    /// An operator asked for it (CLI or API)
    Manual,
}

impl DailyTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyTrigger::Scheduled => "scheduled",
            DailyTrigger::Manual => "manual",
        }
    }
}

impl<S: MetricsStore> MetricsEngine<S> {
    /// Recompute today's snapshot fields. Entry point for the scheduler.
    pub fn calculate_daily_metrics(&self) -> Result<DailyStats> {
        self.recompute_daily(DailyTrigger::Scheduled)
    }

    /// Same recompute as [`Self::calculate_daily_metrics`], on demand.
    pub fn run_daily_metrics_now(&self) -> Result<DailyStats> {
        self.recompute_daily(DailyTrigger::Manual)
    }

    fn recompute_daily(&self, trigger: DailyTrigger) -> Result<DailyStats> {
        let now = self.now();
        let today = now.date_naive();
        let store = self.store();

        let total_opportunities = store.count_active_opportunities()?;
        let active_users = store.count_engaged_users(today)?;
        let new_users = store.count_users_registered_on(today)?;

        let mut stats = store.get_or_create_daily_stats(today, now).map_err(|e| {
            tracing::error!(date = %today, error = %e, "Daily recompute failed");
            e
        })?;
        stats.total_opportunities = total_opportunities;
        stats.active_users = active_users;
        stats.new_users = new_users;
        stats.refresh_derived();
        stats.updated_at = now;
        store.update_daily_stats(&stats).map_err(|e| {
            tracing::error!(date = %today, error = %e, "Daily recompute failed");
            e
        })?;

        tracing::info!(
            trigger = trigger.as_str(),
            date = %today,
            total_opportunities,
            active_users,
            new_users,
            "Daily metrics recomputed"
        );
        Ok(stats)
    }
}
