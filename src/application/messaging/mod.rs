//! Message handling - parsing, invocation context and dispatch

pub mod context;
pub mod dispatcher;
pub mod parser;

pub use context::CommandContext;
pub use dispatcher::{DispatchOutcome, MessageDispatcher, Rejection};
pub use parser::{parse_arguments, tokenize, MessageParser, ParseOutcome, ParsedArguments};
