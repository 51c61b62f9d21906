//! Plugin system for guildbot
//!
//! A plugin bundles commands, config actions and per-tenant default data.
//! Plugins are registered once at startup into a [`PluginRegistry`].

pub mod core_plugin;
pub mod registry;
pub mod utility;

pub use registry::PluginRegistry;

use crate::domain::entities::PluginDefinition;

/// Plugins shipped with the bot, `core` first
pub fn builtin(default_prefix: &str) -> Vec<PluginDefinition> {
    vec![core_plugin::plugin(default_prefix), utility::plugin()]
}
