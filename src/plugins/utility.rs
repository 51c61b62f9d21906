//! Utility plugin: small commands any member can run

use crate::application::messaging::CommandContext;
use crate::domain::entities::{ArgSpec, Command, CommandResult, CommandScope, FlagKind, FlagSpec, FlagValue, PluginDefinition};

pub const NAME: &str = "utility";

const MAX_REPEAT: i64 = 5;

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(NAME)
        .with_description("Ping and echo")
        .with_command(
            Command::new("ping")
                .with_description("Check that the bot is alive")
                .with_scope(CommandScope::Any)
                .with_handler(ping),
        )
        .with_command(
            Command::new("echo")
                .with_description("Repeat some text")
                .with_scope(CommandScope::Any)
                .with_aliases(vec!["say".into()])
                .with_arg(ArgSpec::required("text").greedy())
                .with_flag(FlagSpec::switch("upper").with_short('u'))
                .with_flag(
                    FlagSpec::new("repeat", FlagKind::Int)
                        .with_short('n')
                        .with_default(FlagValue::Int(1)),
                )
                .with_handler(echo),
        )
}

async fn ping(_ctx: CommandContext) -> CommandResult {
    Ok(Some("Pong!".to_string()))
}

async fn echo(ctx: CommandContext) -> CommandResult {
    let repeat = ctx.flag("repeat").and_then(FlagValue::as_int).unwrap_or(1);
    if !(1..=MAX_REPEAT).contains(&repeat) {
        return Ok(Some(format!("`--repeat` must be between 1 and {}.", MAX_REPEAT)));
    }

    let text = ctx.arg("text").unwrap_or_default();
    let text = if ctx.switch("upper") { text.to_uppercase() } else { text.to_string() };

    let lines: Vec<&str> = (0..repeat).map(|_| text.as_str()).collect();
    Ok(Some(lines.join("\n")))
}
