//! Database layer for oppstats
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Store trait implementations for the four aggregate families
//! - Source-of-truth users, opportunities and the raw action log

pub mod repo;
pub mod schema;

pub use repo::Database;
