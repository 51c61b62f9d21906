//! Per-invocation context handed to command bodies and config actions

use std::sync::Arc;

use crate::application::errors::{BoxError, GatewayError};
use crate::application::messaging::parser::ParsedArguments;
use crate::application::services::BotServices;
use crate::domain::entities::{Actor, FlagValue, ParsedInvocation};
use crate::domain::traits::DeliveryReceipt;

/// What a command body sees: its resolved invocation plus the shared services
#[derive(Clone)]
pub struct CommandContext {
    pub invocation: ParsedInvocation,
    pub services: Arc<BotServices>,
}

impl CommandContext {
    pub fn new(invocation: ParsedInvocation, services: Arc<BotServices>) -> Self {
        Self { invocation, services }
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.invocation.arg(name)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.invocation.flag(name)
    }

    pub fn switch(&self, name: &str) -> bool {
        self.invocation.switch(name)
    }

    pub fn actor(&self) -> &Actor {
        &self.invocation.context.actor
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.invocation.tenant_id()
    }

    /// Tenant id, or an error for commands that slipped through in a DM
    pub fn require_tenant(&self) -> Result<&str, BoxError> {
        self.tenant_id()
            .ok_or_else(|| format!("`{}` needs a guild", self.invocation.command.name).into())
    }

    pub fn channel_id(&self) -> &str {
        &self.invocation.context.channel_id
    }

    pub fn is_owner(&self) -> bool {
        self.services.is_owner(&self.actor().id)
    }

    /// Send an extra message to the invoking channel before the body returns
    pub async fn reply(&self, content: &str) -> Result<DeliveryReceipt, GatewayError> {
        self.services.gateway.send(self.channel_id(), content).await
    }

    /// Same invocation, different arguments; used to route config actions
    pub fn with_arguments(&self, parsed: ParsedArguments) -> Self {
        let mut invocation = self.invocation.clone();
        invocation.args = parsed.args;
        invocation.flags = parsed.flags;
        Self {
            invocation,
            services: self.services.clone(),
        }
    }
}
