use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::application::errors::{BoxError, CommandError, RegistryError};
use crate::application::messaging::context::CommandContext;

/// What a command body hands back: an optional reply for the invoking channel
pub type CommandResult = Result<Option<String>, BoxError>;

/// Command handler function type
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Wraps an async closure into a [`CommandHandler`]
pub fn handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Where a command may be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandScope {
    /// Only inside a tenant (guild)
    #[default]
    Guild,
    /// Only in direct messages
    Direct,
    Any,
}

impl CommandScope {
    pub fn allows(&self, in_tenant: bool) -> bool {
        match self {
            CommandScope::Guild => in_tenant,
            CommandScope::Direct => !in_tenant,
            CommandScope::Any => true,
        }
    }
}

/// Positional argument declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
    /// Absorbs every remaining positional token. Only meaningful on the last spec.
    pub greedy: bool,
    /// Takes the rest of the input verbatim, flags and quotes included. Last spec only.
    pub raw: bool,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            greedy: false,
            raw: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            greedy: false,
            raw: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn greedy(mut self) -> Self {
        self.greedy = true;
        self
    }

    /// Optional trailing text handed over untouched, for commands that
    /// parse their own tail
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::optional(name).greedy()
        }
    }
}

/// Type of value a flag carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    String,
    Boolean,
    Int,
}

impl FlagKind {
    /// What a value of this kind looks like, for error messages
    pub fn expected(&self) -> &'static str {
        match self {
            FlagKind::String => "a value",
            FlagKind::Boolean => "true or false",
            FlagKind::Int => "an integer",
        }
    }
}

/// A resolved flag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    String(String),
    Boolean(bool),
    Int(i64),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FlagValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::String(s) => write!(f, "{}", s),
            FlagValue::Boolean(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Flag declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: String,
    pub short: Option<char>,
    pub kind: FlagKind,
    pub default: Option<FlagValue>,
}

impl FlagSpec {
    pub fn new(name: impl Into<String>, kind: FlagKind) -> Self {
        Self {
            name: name.into(),
            short: None,
            kind,
            default: None,
        }
    }

    /// Boolean switch defaulting to `false`
    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::Boolean).with_default(FlagValue::Boolean(false))
    }

    pub fn with_short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn with_default(mut self, default: FlagValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Represents a bot command
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub scope: CommandScope,
    /// Any one of these levels grants access. Empty means unrestricted.
    pub levels: Vec<String>,
    pub args: Vec<ArgSpec>,
    pub flags: Vec<FlagSpec>,
    pub enabled_by_default: bool,
    pub owner_only: bool,
    pub hidden: bool,
    /// Owning plugin, filled in when the plugin is registered
    pub plugin: String,
    pub handler: Option<CommandHandler>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            scope: CommandScope::default(),
            levels: Vec::new(),
            args: Vec::new(),
            flags: Vec::new(),
            enabled_by_default: true,
            owner_only: false,
            hidden: false,
            plugin: String::new(),
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_scope(mut self, scope: CommandScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.levels.push(level.into());
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

    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.handler = Some(handler(f));
        self
    }

    /// One-line usage string, e.g. `!ban <user> <reason...> [--days <int>]`
    pub fn usage(&self, prefix: &str) -> String {
        let mut usage = format!("{}{}", prefix, self.name);
        usage.push_str(&usage_tail(&self.args, &self.flags));
        usage
    }
}

/// Renders argument and flag placeholders shared by commands and config actions
pub fn usage_tail(args: &[ArgSpec], flags: &[FlagSpec]) -> String {
    let mut tail = String::new();
    for arg in args {
        let dots = if arg.greedy { "..." } else { "" };
        if arg.required && arg.default.is_none() {
            tail.push_str(&format!(" <{}{}>", arg.name, dots));
        } else {
            tail.push_str(&format!(" [{}{}]", arg.name, dots));
        }
    }
    for flag in flags {
        let name = match flag.short {
            Some(short) => format!("--{}|-{}", flag.name, short),
            None => format!("--{}", flag.name),
        };
        match flag.kind {
            FlagKind::Boolean => tail.push_str(&format!(" [{}]", name)),
            FlagKind::Int => tail.push_str(&format!(" [{} <int>]", name)),
            FlagKind::String => tail.push_str(&format!(" [{} <value>]", name)),
        }
    }
    tail
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("scope", &self.scope)
            .field("levels", &self.levels)
            .field("args", &self.args)
            .field("flags", &self.flags)
            .field("enabled_by_default", &self.enabled_by_default)
            .field("owner_only", &self.owner_only)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

/// Listing filter for [`CommandRegistry::list`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFilter {
    pub include_hidden: bool,
    pub include_owner_only: bool,
}

/// Command registry for managing available commands
#[derive(Default)]
pub struct CommandRegistry {
    /// Lowercased name -> command
    commands: BTreeMap<String, Arc<Command>>,
    /// Lowercased alias -> lowercased command name
    aliases: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. Names and aliases share one case-insensitive namespace.
    pub fn register(&mut self, command: Command) -> Result<Arc<Command>, RegistryError> {
        let key = command.name.to_lowercase();
        let mut claimed = vec![key.clone()];
        claimed.extend(command.aliases.iter().map(|a| a.to_lowercase()));

        for (i, name) in claimed.iter().enumerate() {
            if self.commands.contains_key(name)
                || self.aliases.contains_key(name)
                || claimed[..i].contains(name)
            {
                return Err(RegistryError::DuplicateCommand(name.clone()));
            }
        }

        let command = Arc::new(command);
        for alias in claimed.into_iter().skip(1) {
            self.aliases.insert(alias, key.clone());
        }
        self.commands.insert(key, command.clone());
        Ok(command)
    }

    /// Case-insensitive lookup by name or alias
    pub fn lookup(&self, name: &str) -> Result<Arc<Command>, CommandError> {
        let key = name.to_lowercase();
        let key = self.aliases.get(&key).unwrap_or(&key);
        self.commands
            .get(key)
            .cloned()
            .ok_or_else(|| CommandError::NotFound(format!("command `{}`", name)))
    }

    /// Commands sorted by name, filtered without touching registry state
    pub fn list(&self, filter: CommandFilter) -> Vec<Arc<Command>> {
        self.commands
            .values()
            .filter(|c| filter.include_hidden || !c.hidden)
            .filter(|c| filter.include_owner_only || !c.owner_only)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
