//! Plugin registry - owns every plugin, command and permission level

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::application::errors::{CommandError, RegistryError};
use crate::domain::entities::{Command, CommandRegistry, PluginDefinition, PluginRecord};

/// Registry for plugins and the commands they own.
///
/// Built once at startup, then frozen behind an `Arc` and handed to every
/// component that needs it.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<PluginRecord>>,
    commands: CommandRegistry,
    levels: BTreeSet<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a permission level commands may require
    pub fn declare_level(&mut self, level: impl Into<String>) -> bool {
        self.levels.insert(level.into().to_lowercase())
    }

    pub fn is_level_declared(&self, level: &str) -> bool {
        self.levels.contains(&level.to_lowercase())
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(String::as_str)
    }

    /// Register a plugin and all of its commands.
    ///
    /// Either everything is registered or nothing is.
    pub fn register(&mut self, definition: PluginDefinition) -> Result<Arc<PluginRecord>, RegistryError> {
        let key = definition.name.to_lowercase();
        if self.plugins.contains_key(&key) {
            return Err(RegistryError::DuplicatePlugin(definition.name));
        }

        let mut claimed = HashSet::new();
        for command in &definition.commands {
            for name in std::iter::once(&command.name).chain(command.aliases.iter()) {
                let name = name.to_lowercase();
                if self.commands.lookup(&name).is_ok() || !claimed.insert(name.clone()) {
                    return Err(RegistryError::DuplicateCommand(name));
                }
            }
        }

        // Defaults of every plugin share one settings namespace per tenant.
        let mut keywords = HashSet::new();
        for entry in &definition.defaults {
            let keyword = entry.keyword.to_lowercase();
            let owner = self
                .plugins
                .values()
                .find(|plugin| plugin.defaults.iter().any(|d| d.keyword.eq_ignore_ascii_case(&keyword)))
                .map(|plugin| plugin.name.clone())
                .or_else(|| (!keywords.insert(keyword.clone())).then(|| definition.name.clone()));
            if let Some(owner) = owner {
                return Err(RegistryError::DuplicateDefault {
                    keyword: entry.keyword.clone(),
                    owner,
                });
            }
        }

        let PluginDefinition {
            name,
            description,
            commands,
            config_actions,
            defaults,
            levels,
            can_be_disabled,
            enabled_by_default,
        } = definition;

        let mut command_names = Vec::with_capacity(commands.len());
        for mut command in commands {
            command.plugin = name.clone();
            command_names.push(command.name.to_lowercase());
            self.commands.register(command)?;
        }
        for level in &levels {
            self.declare_level(level.clone());
        }

        let record = Arc::new(PluginRecord {
            name,
            description,
            commands: command_names,
            config_actions: config_actions
                .into_iter()
                .map(|action| (action.name.to_lowercase(), action))
                .collect(),
            defaults,
            levels,
            can_be_disabled,
            enabled_by_default,
        });

        tracing::info!(
            plugin = %record.name,
            commands = record.commands.len(),
            can_be_disabled = record.can_be_disabled,
            "Registered plugin"
        );
        self.plugins.insert(key, record.clone());
        Ok(record)
    }

    /// Get a plugin by name (case-insensitive)
    pub fn plugin(&self, name: &str) -> Option<Arc<PluginRecord>> {
        self.plugins.get(&name.to_lowercase()).cloned()
    }

    /// Plugins sorted by name
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<PluginRecord>> {
        self.plugins.values()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn lookup_command(&self, name: &str) -> Result<Arc<Command>, CommandError> {
        self.commands.lookup(name)
    }

    /// Levels referenced by commands but never declared, as `(command, level)`
    pub fn undeclared_levels(&self) -> Vec<(String, String)> {
        self.commands
            .all()
            .flat_map(|cmd| {
                cmd.levels
                    .iter()
                    .filter(|level| !self.is_level_declared(level))
                    .map(|level| (cmd.name.clone(), level.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Get the number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_owning_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDefinition::new("moderation").with_command(Command::new("Ban")))
            .unwrap();

        let ban = registry.lookup_command("ban").unwrap();
        assert_eq!(ban.plugin, "moderation");
        assert_eq!(registry.plugin("MODERATION").unwrap().commands, vec!["ban"]);
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginDefinition::new("tags")).unwrap();
        assert_eq!(
            registry.register(PluginDefinition::new("tags")).unwrap_err(),
            RegistryError::DuplicatePlugin("tags".into())
        );
    }

    #[test]
    fn test_duplicate_command_leaves_registry_untouched() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDefinition::new("a").with_command(Command::new("ping")))
            .unwrap();

        let err = registry
            .register(
                PluginDefinition::new("b")
                    .with_command(Command::new("pong"))
                    .with_command(Command::new("PING")),
            )
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateCommand("ping".into()));
        assert!(registry.lookup_command("pong").is_err());
        assert!(registry.plugin("b").is_none());
    }

    #[test]
    fn test_shared_default_keyword_rejected() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDefinition::new("core").with_default("prefix", "!"))
            .unwrap();

        let err = registry
            .register(
                PluginDefinition::new("tags")
                    .with_default("tag-limit", 10)
                    .with_default("Prefix", "?"),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateDefault {
                keyword: "Prefix".into(),
                owner: "core".into()
            }
        );
        assert!(registry.plugin("tags").is_none());

        let err = registry
            .register(
                PluginDefinition::new("fun")
                    .with_default("greeting", "hi")
                    .with_default("greeting", "yo"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateDefault { owner, .. } if owner == "fun"));
    }

    #[test]
    fn test_levels_declared_and_checked() {
        let mut registry = PluginRegistry::new();
        registry.declare_level("Moderator");
        registry
            .register(
                PluginDefinition::new("core")
                    .with_level("admin")
                    .with_command(Command::new("grant").with_level("admin"))
                    .with_command(Command::new("purge").with_level("janitor")),
            )
            .unwrap();

        assert!(registry.is_level_declared("moderator"));
        assert!(registry.is_level_declared("ADMIN"));
        assert_eq!(
            registry.undeclared_levels(),
            vec![("purge".to_string(), "janitor".to_string())]
        );
    }
}
