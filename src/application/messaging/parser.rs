//! Message parser - Turns raw text into command invocations
//!
//! Grammar: `<prefix><name> [arg ...] [--flag [value]] [-x [value]]`.
//! Single quotes, double quotes and `{ }` braces group text into one token;
//! `--help` or `-h` anywhere short-circuits to usage.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::ValidationError;
use crate::domain::entities::{
    ArgSpec, Command, FlagKind, FlagSpec, FlagValue, InvocationContext, ParsedInvocation,
};

static LONG_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--([A-Za-z][A-Za-z0-9_-]*)(?:=(.*))?$").expect("valid long flag regex"));
static SHORT_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-([A-Za-z])$").expect("valid short flag regex"));

/// One lexical token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// The token opened with a quote or brace; never treated as a flag
    pub quoted: bool,
    /// Byte offset of the token's first character in the input
    pub start: usize,
}

#[derive(Clone, Copy)]
enum Mode {
    Plain,
    Single,
    Double { escape: bool },
    Brace(usize),
}

/// Split text into tokens, keeping quoted and braced groups atomic.
///
/// An unterminated group runs to the end of input.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Any group seen in this token; an empty `""` still yields a token.
    let mut grouped = false;
    // The token opened with a group, e.g. `"--x"`.
    let mut literal = false;
    let mut start = 0;
    let mut mode = Mode::Plain;

    for (at, ch) in input.char_indices() {
        match mode {
            Mode::Plain => {
                let fresh = current.is_empty() && !grouped;
                let opens = match ch {
                    c if c.is_whitespace() => {
                        if !fresh {
                            tokens.push(Token {
                                text: std::mem::take(&mut current),
                                quoted: literal,
                                start,
                            });
                            grouped = false;
                            literal = false;
                        }
                        None
                    }
                    '\'' => Some(Mode::Single),
                    '"' => Some(Mode::Double { escape: false }),
                    '{' => Some(Mode::Brace(1)),
                    c => {
                        if fresh {
                            start = at;
                        }
                        current.push(c);
                        None
                    }
                };
                if let Some(next) = opens {
                    if fresh {
                        literal = true;
                        start = at;
                    }
                    grouped = true;
                    mode = next;
                }
            }
            Mode::Single => match ch {
                '\'' => mode = Mode::Plain,
                c => current.push(c),
            },
            Mode::Double { escape: true } => {
                current.push(ch);
                mode = Mode::Double { escape: false };
            }
            Mode::Double { escape: false } => match ch {
                '\\' => mode = Mode::Double { escape: true },
                '"' => mode = Mode::Plain,
                c => current.push(c),
            },
            Mode::Brace(depth) => match ch {
                '{' => {
                    current.push(ch);
                    mode = Mode::Brace(depth + 1);
                }
                '}' if depth == 1 => mode = Mode::Plain,
                '}' => {
                    current.push(ch);
                    mode = Mode::Brace(depth - 1);
                }
                c => current.push(c),
            },
        }
    }

    if !current.is_empty() || grouped {
        tokens.push(Token {
            text: current,
            quoted: literal,
            start,
        });
    }

    tokens
}

/// Reference to a flag as written in the message
#[derive(Debug, Clone, PartialEq, Eq)]
enum FlagRef<'a> {
    Long { name: &'a str, inline: Option<&'a str> },
    Short(char),
}

fn classify(token: &Token) -> Option<FlagRef<'_>> {
    if token.quoted {
        return None;
    }
    if let Some(caps) = LONG_FLAG.captures(&token.text) {
        let name = caps.get(1)?.as_str();
        let inline = caps.get(2).map(|m| m.as_str());
        return Some(FlagRef::Long { name, inline });
    }
    SHORT_FLAG
        .captures(&token.text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().chars().next())
        .map(FlagRef::Short)
}

fn is_help(flag: &FlagRef<'_>, flags: &[FlagSpec]) -> bool {
    match flag {
        FlagRef::Long { name, .. } => name.eq_ignore_ascii_case("help") && !flags.iter().any(|f| f.name == "help"),
        FlagRef::Short('h') => !flags.iter().any(|f| f.short == Some('h')),
        FlagRef::Short(_) => false,
    }
}

/// Arguments and flags resolved against a set of specs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    pub args: HashMap<String, String>,
    pub flags: HashMap<String, FlagValue>,
}

/// Result of parsing a command or config action tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    /// `--help` / `-h` was present
    Help,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Resolve one flag reference, consuming its value token when it takes one
fn resolve_flag(
    flag: FlagRef<'_>,
    token: &Token,
    flag_specs: &[FlagSpec],
    tokens: &[Token],
    next: &mut usize,
) -> Result<(String, FlagValue), ValidationError> {
    let (spec, inline) = match flag {
        FlagRef::Long { name, inline } => (flag_specs.iter().find(|f| f.name == name), inline),
        FlagRef::Short(short) => (flag_specs.iter().find(|f| f.short == Some(short)), None),
    };
    let spec = spec.ok_or_else(|| ValidationError::UnknownFlag(token.text.clone()))?;
    let invalid = |value: &str| ValidationError::InvalidFlagValue {
        flag: spec.name.clone(),
        expected: spec.kind.expected(),
        value: value.to_string(),
    };

    let value = match spec.kind {
        FlagKind::Boolean => match inline {
            Some(raw) => FlagValue::Boolean(parse_bool(raw).ok_or_else(|| invalid(raw))?),
            None => FlagValue::Boolean(true),
        },
        kind => {
            let raw = match inline {
                Some(raw) => raw.to_string(),
                None => {
                    let value = tokens
                        .get(*next)
                        .filter(|t| classify(t).is_none())
                        .ok_or_else(|| ValidationError::MissingFlagValue(spec.name.clone()))?;
                    *next += 1;
                    value.text.clone()
                }
            };
            if kind == FlagKind::Int {
                FlagValue::Int(raw.parse::<i64>().map_err(|_| invalid(&raw))?)
            } else {
                FlagValue::String(raw)
            }
        }
    };
    Ok((spec.name.clone(), value))
}

/// Resolve a token list against argument and flag specs.
///
/// A bare `--` ends flag parsing. When the last spec is [`ArgSpec::raw`], the
/// text from the first token it would receive onwards is kept verbatim and
/// never scanned for flags.
pub fn parse_arguments(
    arg_specs: &[ArgSpec],
    flag_specs: &[FlagSpec],
    input: &str,
) -> Result<ParseOutcome<ParsedArguments>, ValidationError> {
    let tokens = tokenize(input);
    let raw_at = arg_specs.last().filter(|spec| spec.raw).map(|_| arg_specs.len() - 1);

    let mut parsed = ParsedArguments::default();
    let mut positional = Vec::new();
    let mut raw_tail = None;
    let mut help = false;
    let mut error = None;
    let mut flags_ended = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if raw_at == Some(positional.len()) {
            raw_tail = Some(input[token.start..].trim_end().to_string());
            break;
        }
        i += 1;

        if !flags_ended && !token.quoted && token.text == "--" {
            flags_ended = true;
            continue;
        }
        let Some(flag) = classify(token).filter(|_| !flags_ended) else {
            positional.push(token.text.clone());
            continue;
        };
        if is_help(&flag, flag_specs) {
            help = true;
            continue;
        }
        if error.is_some() {
            continue;
        }
        match resolve_flag(flag, token, flag_specs, &tokens, &mut i) {
            Ok((name, value)) => {
                parsed.flags.insert(name, value);
            }
            Err(e) => error = Some(e),
        }
    }

    if help {
        return Ok(ParseOutcome::Help);
    }
    if let Some(e) = error {
        return Err(e);
    }

    for spec in flag_specs {
        if !parsed.flags.contains_key(&spec.name) {
            if let Some(default) = &spec.default {
                parsed.flags.insert(spec.name.clone(), default.clone());
            }
        }
    }

    let mut remaining = positional.into_iter();
    let last = arg_specs.len().saturating_sub(1);
    for (index, spec) in arg_specs.iter().enumerate() {
        let value = if raw_at == Some(index) {
            raw_tail.take()
        } else if spec.greedy && index == last {
            let rest: Vec<String> = remaining.by_ref().collect();
            (!rest.is_empty()).then(|| rest.join(" "))
        } else {
            remaining.next()
        };

        match value.or_else(|| spec.default.clone()) {
            Some(value) => {
                parsed.args.insert(spec.name.clone(), value);
            }
            None if spec.required => return Err(ValidationError::MissingArgument(spec.name.clone())),
            None => {}
        }
    }

    if let Some(extra) = remaining.next() {
        return Err(ValidationError::UnexpectedArgument(extra));
    }

    Ok(ParseOutcome::Parsed(parsed))
}

/// A prefix match: command name and the untouched remainder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCall<'a> {
    pub name: &'a str,
    pub rest: &'a str,
}

/// Parses incoming text into command invocations
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    /// Prefix used when a tenant has none of its own
    pub fn default_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// `<prefix><name> rest...` -> name and rest. `None` when the prefix is absent
    /// or nothing follows it.
    pub fn split<'a>(&self, text: &'a str, prefix: &str) -> Option<CommandCall<'a>> {
        let body = text.trim_start().strip_prefix(prefix)?;
        let end = body.find(char::is_whitespace).unwrap_or(body.len());
        let (name, rest) = body.split_at(end);
        if name.is_empty() {
            return None;
        }
        Some(CommandCall { name, rest: rest.trim() })
    }

    /// Resolve a command's arguments and flags into a [`ParsedInvocation`]
    pub fn parse_invocation(
        &self,
        command: Arc<Command>,
        rest: &str,
        context: InvocationContext,
    ) -> Result<ParseOutcome<ParsedInvocation>, ValidationError> {
        match parse_arguments(&command.args, &command.flags, rest)? {
            ParseOutcome::Help => Ok(ParseOutcome::Help),
            ParseOutcome::Parsed(parsed) => Ok(ParseOutcome::Parsed(ParsedInvocation {
                command,
                args: parsed.args,
                flags: parsed.flags,
                context,
            })),
        }
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new("!")
    }
}
