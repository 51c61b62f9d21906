//! Core plugin: help, enablement, permissions, config routing and shutdown

use crate::application::errors::{EnablementError, PermissionError};
use crate::application::messaging::parser::{parse_arguments, ParseOutcome};
use crate::application::messaging::CommandContext;
use crate::application::services::command_service::{command_help, command_list};
use crate::domain::entities::command::usage_tail;
use crate::domain::entities::{
    ArgSpec, Command, CommandFilter, CommandResult, CommandScope, ConfigAction, FlagSpec, PermissionTarget,
    PluginDefinition,
};

pub const NAME: &str = "core";

/// Level gating every administrative core command
pub const ADMIN_LEVEL: &str = "admin";

const MAX_PREFIX_LEN: usize = 8;

/// Build the core plugin; `default_prefix` seeds each tenant's `prefix` entry
pub fn plugin(default_prefix: &str) -> PluginDefinition {
    PluginDefinition::new(NAME)
        .with_description("Built-in administration")
        .always_enabled()
        .with_level(ADMIN_LEVEL)
        .with_default("prefix", default_prefix)
        .with_command(
            Command::new("help")
                .with_description("List commands or show how to use one")
                .with_scope(CommandScope::Any)
                .with_aliases(vec!["commands".into()])
                .with_arg(ArgSpec::optional("command"))
                .with_handler(help),
        )
        .with_command(
            Command::new("plugins")
                .with_description("List plugins and whether they are enabled here")
                .with_handler(plugins),
        )
        .with_command(
            Command::new("enable")
                .with_description("Enable a plugin or command")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("name"))
                .with_handler(enable),
        )
        .with_command(
            Command::new("disable")
                .with_description("Disable a plugin or command")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("name"))
                .with_handler(disable),
        )
        .with_command(
            Command::new("grant")
                .with_description("Add a user or role to a permission level")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("level"))
                .with_arg(ArgSpec::required("target"))
                .with_flag(FlagSpec::switch("role").with_short('r'))
                .with_handler(grant),
        )
        .with_command(
            Command::new("revoke")
                .with_description("Remove a user or role from a permission level")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("level"))
                .with_arg(ArgSpec::required("target"))
                .with_flag(FlagSpec::switch("role").with_short('r'))
                .with_handler(revoke),
        )
        .with_command(
            Command::new("level")
                .with_description("Show who holds a permission level")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("level"))
                .with_handler(level),
        )
        .with_command(
            Command::new("config")
                .with_description("Run a plugin config action")
                .with_level(ADMIN_LEVEL)
                .with_arg(ArgSpec::required("plugin"))
                .with_arg(ArgSpec::required("action"))
                .with_arg(ArgSpec::raw("inputs"))
                .with_handler(config),
        )
        .with_command(
            Command::new("shutdown")
                .with_description("Stop the bot")
                .with_scope(CommandScope::Any)
                .owner_only()
                .with_handler(shutdown),
        )
        .with_config_action(
            ConfigAction::new("prefix", set_prefix)
                .with_description("Change the command prefix for this guild")
                .with_arg(ArgSpec::required("prefix")),
        )
}

async fn help(ctx: CommandContext) -> CommandResult {
    let prefix = ctx.services.prefix_for(ctx.tenant_id()).await?;

    if let Some(name) = ctx.arg("command") {
        let name = name.strip_prefix(prefix.as_str()).unwrap_or(name);
        return Ok(Some(match ctx.services.registry.lookup_command(name) {
            Ok(cmd) if !cmd.owner_only || ctx.is_owner() => command_help(&cmd, &prefix),
            _ => format!("No command named `{}`. Try `{}help`.", name, prefix),
        }));
    }

    let filter = CommandFilter {
        include_hidden: false,
        include_owner_only: ctx.is_owner(),
    };
    Ok(Some(command_list(&ctx.services.registry, &prefix, filter)))
}

async fn plugins(ctx: CommandContext) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let mut out = "Plugins:".to_string();

    for plugin in ctx.services.registry.plugins() {
        let state = if !plugin.can_be_disabled {
            "always on"
        } else if ctx.services.enablement.is_plugin_enabled(tenant_id, &plugin.name).await? {
            "enabled"
        } else {
            "disabled"
        };
        out.push_str(&format!(
            "\n  {} ({}) - {}",
            plugin.name,
            state,
            plugin.description.as_deref().unwrap_or("")
        ));
    }
    Ok(Some(out))
}

/// Turns expected enablement outcomes into replies; storage failures propagate
fn enablement_reply(result: Result<String, EnablementError>) -> CommandResult {
    match result {
        Ok(done) => Ok(Some(done)),
        Err(EnablementError::Storage(e)) => Err(e.into()),
        Err(e) => Ok(Some(e.to_string())),
    }
}

async fn toggle(ctx: CommandContext, enabled: bool) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let name = ctx.arg("name").unwrap_or_default();
    let services = &ctx.services;
    let verb = if enabled { "enabled" } else { "disabled" };

    let result = if services.registry.plugin(name).is_some() {
        let outcome = if enabled {
            services.enablement.enable_plugin(tenant_id, name).await
        } else {
            services.enablement.disable_plugin(tenant_id, name).await
        };
        outcome.map(|()| format!("Plugin `{}` {}.", name, verb))
    } else if services.registry.lookup_command(name).is_ok() {
        let outcome = if enabled {
            services.enablement.enable_command(tenant_id, name).await
        } else {
            services.enablement.disable_command(tenant_id, name).await
        };
        outcome.map(|()| format!("Command `{}` {}.", name, verb))
    } else {
        Err(EnablementError::PluginNotFound(name.to_string()))
    };

    match result {
        Err(EnablementError::PluginNotFound(_)) => {
            let prefix = services.prefix_for(Some(tenant_id)).await?;
            Ok(Some(format!(
                "No plugin or command named `{}`. Try `{}plugins` or `{}help`.",
                name, prefix, prefix
            )))
        }
        other => enablement_reply(other),
    }
}

async fn enable(ctx: CommandContext) -> CommandResult {
    toggle(ctx, true).await
}

async fn disable(ctx: CommandContext) -> CommandResult {
    toggle(ctx, false).await
}

/// Accepts raw ids and platform mentions such as `<@123>` or `<@&456>`
fn parse_target(raw: &str, role: bool) -> PermissionTarget {
    let id = raw
        .trim_start_matches('<')
        .trim_start_matches('@')
        .trim_start_matches(['&', '!'])
        .trim_end_matches('>')
        .to_string();
    if role || raw.starts_with("<@&") {
        PermissionTarget::Role(id)
    } else {
        PermissionTarget::User(id)
    }
}

fn permission_reply(ctx: &CommandContext, result: Result<String, PermissionError>) -> CommandResult {
    match result {
        Ok(done) => Ok(Some(done)),
        Err(PermissionError::Storage(e)) => Err(e.into()),
        Err(PermissionError::UndeclaredLevel(level)) => {
            let levels: Vec<&str> = ctx.services.registry.levels().collect();
            Ok(Some(format!("No level named `{}`. Levels: {}", level, levels.join(", "))))
        }
        Err(e) => Ok(Some(e.to_string())),
    }
}

async fn grant(ctx: CommandContext) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let level = ctx.arg("level").unwrap_or_default();
    let target = parse_target(ctx.arg("target").unwrap_or_default(), ctx.switch("role"));

    let result = ctx
        .services
        .permissions
        .grant(tenant_id, level, &target)
        .await
        .map(|_| format!("Granted `{}` to {}.", level, target));
    permission_reply(&ctx, result)
}

async fn revoke(ctx: CommandContext) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let level = ctx.arg("level").unwrap_or_default();
    let target = parse_target(ctx.arg("target").unwrap_or_default(), ctx.switch("role"));

    let result = ctx
        .services
        .permissions
        .revoke(tenant_id, level, &target)
        .await
        .map(|_| format!("Revoked `{}` from {}.", level, target));
    permission_reply(&ctx, result)
}

async fn level(ctx: CommandContext) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let level = ctx.arg("level").unwrap_or_default();

    let result = ctx
        .services
        .permissions
        .get_permissions_data(tenant_id, level)
        .await
        .map(|membership| {
            if membership.is_empty() {
                return format!("Nobody holds `{}`.", level);
            }
            let users: Vec<&str> = membership.users.iter().map(String::as_str).collect();
            let roles: Vec<&str> = membership.roles.iter().map(String::as_str).collect();
            format!(
                "`{}`\n  users: {}\n  roles: {}",
                level,
                if users.is_empty() { "-".to_string() } else { users.join(", ") },
                if roles.is_empty() { "-".to_string() } else { roles.join(", ") },
            )
        });
    permission_reply(&ctx, result)
}

async fn config(ctx: CommandContext) -> CommandResult {
    let prefix = ctx.services.prefix_for(ctx.tenant_id()).await?;
    let plugin_name = ctx.arg("plugin").unwrap_or_default();
    let action_name = ctx.arg("action").unwrap_or_default();

    let Some(plugin) = ctx.services.registry.plugin(plugin_name) else {
        return Ok(Some(format!(
            "No plugin named `{}`. Try `{}plugins`.",
            plugin_name, prefix
        )));
    };
    let Some(action) = plugin.config_action(action_name) else {
        let actions: Vec<&str> = plugin.config_actions.values().map(|a| a.name.as_str()).collect();
        let available = if actions.is_empty() { "none".to_string() } else { actions.join(", ") };
        return Ok(Some(format!(
            "`{}` has no config action `{}`. Available: {}",
            plugin.name, action_name, available
        )));
    };

    let inputs = ctx.arg("inputs").unwrap_or_default();
    let usage = format!(
        "{}config {} {}{}",
        prefix,
        plugin.name,
        action.name,
        usage_tail(&action.args, &action.flags)
    );

    match parse_arguments(&action.args, &action.flags, inputs) {
        Ok(ParseOutcome::Help) => {
            let mut help = format!("Usage: {}", usage);
            if let Some(description) = &action.description {
                help.push_str(&format!("\n{}", description));
            }
            Ok(Some(help))
        }
        Ok(ParseOutcome::Parsed(parsed)) => {
            tracing::info!(plugin = %plugin.name, action = %action.name, "Running config action");
            (action.handler)(ctx.with_arguments(parsed)).await
        }
        Err(e) => Ok(Some(format!("{}\nUsage: {}", e, usage))),
    }
}

async fn set_prefix(ctx: CommandContext) -> CommandResult {
    let tenant_id = ctx.require_tenant()?;
    let prefix = ctx.arg("prefix").unwrap_or_default();

    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) || prefix.chars().count() > MAX_PREFIX_LEN {
        return Ok(Some(format!(
            "A prefix must be 1 to {} characters with no spaces.",
            MAX_PREFIX_LEN
        )));
    }

    let stored = ctx.services.set_prefix(tenant_id, prefix).await?;
    Ok(Some(format!("Prefix set to `{}`.", stored)))
}

async fn shutdown(ctx: CommandContext) -> CommandResult {
    tracing::warn!(actor = %ctx.actor().id, "Shutdown requested");
    ctx.reply("Shutting down.").await?;
    ctx.services.shutdown.cancel();
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_hands_inputs_over_verbatim() {
        let definition = plugin("!");
        let config = definition.commands.iter().find(|c| c.name == "config").unwrap();
        let parsed = match parse_arguments(&config.args, &config.flags, "tags limit 5 --force \"a  b\"").unwrap() {
            ParseOutcome::Parsed(parsed) => parsed,
            ParseOutcome::Help => panic!("unexpected help"),
        };

        assert_eq!(parsed.args.get("plugin").unwrap(), "tags");
        assert_eq!(parsed.args.get("action").unwrap(), "limit");
        assert_eq!(parsed.args.get("inputs").unwrap(), "5 --force \"a  b\"");
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("123", false), PermissionTarget::User("123".into()));
        assert_eq!(parse_target("<@!123>", false), PermissionTarget::User("123".into()));
        assert_eq!(parse_target("<@&456>", false), PermissionTarget::Role("456".into()));
        assert_eq!(parse_target("mods", true), PermissionTarget::Role("mods".into()));
    }

    #[test]
    fn test_admin_commands_are_gated() {
        let definition = plugin("!");
        for name in ["enable", "disable", "grant", "revoke", "level", "config"] {
            let cmd = definition.commands.iter().find(|c| c.name == name).unwrap();
            assert_eq!(cmd.levels, vec![ADMIN_LEVEL.to_string()], "{}", name);
        }
        assert!(!definition.can_be_disabled);
    }
}
