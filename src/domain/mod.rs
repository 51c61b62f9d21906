//! Domain layer - Core business logic with no external dependencies
//! 
//! This layer contains:
//! - Entities: Core business objects (Actor, InboundMessage, Command, PluginRecord)
//! - Traits: Abstractions for infrastructure (ChatGateway, StorageBackend)

pub mod entities;
pub mod traits;
