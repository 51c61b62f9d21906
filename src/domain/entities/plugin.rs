use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde_json::Value;

use super::command::{handler, ArgSpec, Command, CommandHandler, CommandResult, FlagSpec};
use crate::application::messaging::context::CommandContext;

/// Administrative sub-command reached through `config <plugin> <action>`
#[derive(Clone)]
pub struct ConfigAction {
    pub name: String,
    pub description: Option<String>,
    pub args: Vec<ArgSpec>,
    pub flags: Vec<FlagSpec>,
    pub handler: CommandHandler,
}

impl ConfigAction {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            args: Vec::new(),
            flags: Vec::new(),
            handler: handler(f),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }
}

impl fmt::Debug for ConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigAction")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Tenant setting seeded on first contact when no value exists yet
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultEntry {
    pub keyword: String,
    pub value: Value,
}

/// A plugin as declared by its author, before registration
pub struct PluginDefinition {
    pub name: String,
    pub description: Option<String>,
    pub commands: Vec<Command>,
    pub config_actions: Vec<ConfigAction>,
    pub defaults: Vec<DefaultEntry>,
    /// Permission levels this plugin's commands may reference
    pub levels: Vec<String>,
    pub can_be_disabled: bool,
    pub enabled_by_default: bool,
}

impl PluginDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            commands: Vec::new(),
            config_actions: Vec::new(),
            defaults: Vec::new(),
            levels: Vec::new(),
            can_be_disabled: true,
            enabled_by_default: true,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_config_action(mut self, action: ConfigAction) -> Self {
        self.config_actions.push(action);
        self
    }

    pub fn with_default(mut self, keyword: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push(DefaultEntry {
            keyword: keyword.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.levels.push(level.into());
        self
    }

    pub fn always_enabled(mut self) -> Self {
        self.can_be_disabled = false;
        self
    }

    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }
}

/// A registered plugin. Immutable for the life of the process.
#[derive(Debug)]
pub struct PluginRecord {
    pub name: String,
    pub description: Option<String>,
    /// Lowercased names of the commands this plugin owns
    pub commands: Vec<String>,
    /// Keyed by lowercased action name
    pub config_actions: BTreeMap<String, ConfigAction>,
    pub defaults: Vec<DefaultEntry>,
    pub levels: Vec<String>,
    pub can_be_disabled: bool,
    pub enabled_by_default: bool,
}

impl PluginRecord {
    pub fn config_action(&self, name: &str) -> Option<&ConfigAction> {
        self.config_actions.get(&name.to_lowercase())
    }
}
