//! # Local Store Module
//!
//! Owns the review playlist cache database and provides repository patterns
//! for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository patterns for playlists, versions, notes, attachments
//! - Transaction-scoped helpers for multi-row reconciliation passes

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod tx;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
