//! guildbot - plugin-based chat bot command framework
//!
//! Inbound text is matched to registered commands, checked against per-guild
//! enablement and permission levels, parsed into typed arguments and run.
//! Per-guild data lives behind a TTL cache over a pluggable storage backend.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
