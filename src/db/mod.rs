//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer over positions, trade history and the execution audit ledger

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{RepoError, Repository};
