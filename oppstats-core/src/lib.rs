//! # oppstats-core
//!
//! Core library for oppstats - a real-time metrics engine for an
//! opportunity platform.
//!
//! This library provides:
//! - Domain types for raw actions and the four aggregates
//! - The metrics engine that folds events into those aggregates
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through two layers:
//! - **Source of truth:** users, opportunities and the raw action log
//! - **Derived:** user analytics, daily stats, opportunity stats and daily
//!   user engagement, updated incrementally on every event
//!
//! ## Example
//!
//! ```rust,no_run
//! use oppstats_core::{Config, Database, MetricsEngine};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let engine = MetricsEngine::with_config(db, config.metrics);
//! engine.track_action(42, "viewed", Some(7), None).expect("track failed");
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{Clock, MetricsEngine, PlatformSummary, SystemClock};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::MetricsStore;
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
