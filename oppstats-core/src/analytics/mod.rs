//! Analytics module for oppstats
//!
//! - [`engine`]: the event ingestion pipeline and read accessors
//! - [`calc`]: pure rate, average and score calculators
//! - [`daily`]: the daily recompute of snapshot fields
//! - [`summary`]: the platform summary
//! - [`metrics_registry`]: descriptors of every derived metric

pub mod calc;
pub mod daily;
pub mod engine;
pub mod metrics_registry;
pub mod summary;

pub use daily::DailyTrigger;
pub use engine::{Clock, MetricsEngine, SystemClock};
pub use summary::PlatformSummary;
