//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: permissions, enablement, help text and the bot lifecycle
//! - Messaging: parsing, invocation context and the dispatch pipeline
//! - Errors: typed errors per concern

pub mod errors;
pub mod messaging;
pub mod services;
