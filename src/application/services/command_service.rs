//! Help and usage text for registered commands

use crate::domain::entities::{Command, CommandFilter};
use crate::plugins::PluginRegistry;

/// Help block for one command: usage line, description and aliases
pub fn command_help(command: &Command, prefix: &str) -> String {
    let mut help = format!("Usage: {}", command.usage(prefix));
    if let Some(description) = &command.description {
        help.push_str(&format!("\n{}", description));
    }
    if !command.aliases.is_empty() {
        let aliases: Vec<String> = command.aliases.iter().map(|a| format!("{}{}", prefix, a)).collect();
        help.push_str(&format!("\nAliases: {}", aliases.join(", ")));
    }
    help
}

/// Command listing grouped by plugin, in registration-name order
pub fn command_list(registry: &PluginRegistry, prefix: &str, filter: CommandFilter) -> String {
    let visible = registry.commands().list(filter);
    let mut help = "Available commands:".to_string();

    for plugin in registry.plugins() {
        let commands: Vec<_> = visible.iter().filter(|cmd| cmd.plugin == plugin.name).collect();
        if commands.is_empty() {
            continue;
        }
        help.push_str(&format!("\n[{}]", plugin.name));
        for cmd in commands {
            help.push_str(&format!(
                "\n  {}{} - {}",
                prefix,
                cmd.name,
                cmd.description.as_deref().unwrap_or("")
            ));
        }
    }
    help
}
