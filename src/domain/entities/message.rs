use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::command::{Command, FlagValue};
use super::user::Actor;

/// A message delivered by the chat gateway
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub text: String,
    pub actor: Actor,
    /// `None` for direct messages
    pub tenant_id: Option<String>,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        text: impl Into<String>,
        actor: Actor,
        tenant_id: Option<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            actor,
            tenant_id,
            channel_id: channel_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Message sent inside a tenant
    pub fn in_tenant(
        text: impl Into<String>,
        actor: Actor,
        tenant_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self::new(text, actor, Some(tenant_id.into()), channel_id)
    }

    /// Direct message
    pub fn direct(text: impl Into<String>, actor: Actor, channel_id: impl Into<String>) -> Self {
        Self::new(text, actor, None, channel_id)
    }
}

/// Who invoked a command, and where
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub actor: Actor,
    pub tenant_id: Option<String>,
    pub channel_id: String,
    pub raw: String,
}

impl From<&InboundMessage> for InvocationContext {
    fn from(message: &InboundMessage) -> Self {
        Self {
            actor: message.actor.clone(),
            tenant_id: message.tenant_id.clone(),
            channel_id: message.channel_id.clone(),
            raw: message.text.clone(),
        }
    }
}

/// A fully resolved command invocation; lives for one pass through the pipeline
#[derive(Debug, Clone)]
pub struct ParsedInvocation {
    pub command: Arc<Command>,
    pub args: HashMap<String, String>,
    pub flags: HashMap<String, FlagValue>,
    pub context: InvocationContext,
}

impl ParsedInvocation {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }

    /// `true` only when the boolean flag was resolved to `true`
    pub fn switch(&self, name: &str) -> bool {
        self.flag(name).and_then(FlagValue::as_bool).unwrap_or(false)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.context.tenant_id.as_deref()
    }
}
