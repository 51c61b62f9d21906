//! Domain entities - Core business objects with no external dependencies

pub mod user;
pub mod message;
pub mod command;
pub mod permission;
pub mod plugin;

pub use user::Actor;
pub use message::{InboundMessage, InvocationContext, ParsedInvocation};
pub use command::{
    ArgSpec, Command, CommandFilter, CommandHandler, CommandRegistry, CommandResult, CommandScope,
    FlagKind, FlagSpec, FlagValue,
};
pub use permission::{LevelMembership, PermissionTarget};
pub use plugin::{ConfigAction, DefaultEntry, PluginDefinition, PluginRecord};
