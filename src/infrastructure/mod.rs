//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: Storage backends and the cached data store
//! - Database: SQLite backend
//! - Adapters: Chat gateway implementations (console, in-memory)

pub mod adapters;
pub mod config;
pub mod database;
pub mod storage;
