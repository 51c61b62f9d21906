//! Message dispatcher - runs one inbound message through the command pipeline
//!
//! Stages, in order: match, scope, default data, enablement, permission,
//! parse, execute, respond. Every stage before execution can end the
//! pipeline with a short reply to the invoking channel. Failures inside a
//! command body never leave [`MessageDispatcher::dispatch`]; they become an
//! operator report plus an apology.

use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::application::errors::{BoxError, EnablementError, PermissionError, StorageError, ValidationError};
use crate::application::services::command_service::command_help;
use crate::application::services::enablement_service::{CommandState, DisabledReason};
use crate::application::services::BotServices;
use crate::domain::entities::{Command, InboundMessage, InvocationContext};

use super::context::CommandContext;
use super::parser::ParseOutcome;

/// Why a matched command was turned away before running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    WrongScope,
    Disabled(DisabledReason),
    PermissionDenied,
    Invalid(ValidationError),
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command, an unknown command, or the bot is shutting down
    Ignored,
    Rejected(Rejection),
    /// `--help` was answered with usage
    Help,
    Completed,
    /// Reported to the operator under this incident id
    Failed { incident: String },
}

/// Failure contained at the pipeline boundary
#[derive(Debug)]
enum Failure {
    Command(BoxError),
    Panic(String),
    Storage(StorageError),
    Misconfigured(String),
}

impl Failure {
    fn kind(&self) -> &'static str {
        match self {
            Failure::Command(_) => "command error",
            Failure::Panic(_) => "command panic",
            Failure::Storage(_) => "storage error",
            Failure::Misconfigured(_) => "configuration error",
        }
    }

    fn describe(&self) -> String {
        match self {
            Failure::Command(e) => error_chain(e.as_ref()),
            Failure::Panic(msg) => msg.clone(),
            Failure::Storage(e) => error_chain(e),
            Failure::Misconfigured(msg) => msg.clone(),
        }
    }

    fn apology(&self, incident: &str) -> String {
        match self {
            Failure::Storage(_) => format!(
                "I can't reach my storage right now, please try again shortly. (incident {})",
                incident
            ),
            _ => format!(
                "Sorry, something went wrong while running that command. The operators have been notified. (incident {})",
                incident
            ),
        }
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(out, "\n  caused by: {}", cause);
        source = cause.source();
    }
    out
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Operator-facing description of one failure.
///
/// The backtrace is taken here, at the reporting site; the error chain and
/// panic message are the only record of where the failure was raised.
fn incident_report(incident: &str, failure: &Failure, message: &InboundMessage, command: Option<&Command>) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "Incident {} ({}) at {}", incident, failure.kind(), Utc::now().to_rfc3339());
    if let Some(command) = command {
        let _ = writeln!(report, "Command: {} (plugin {})", command.name, command.plugin);
    }
    let _ = writeln!(report, "Actor: {} ({})", message.actor.display_name(), message.actor.id);
    let _ = writeln!(report, "Tenant: {}", message.tenant_id.as_deref().unwrap_or("direct message"));
    let _ = writeln!(report, "Channel: {}", message.channel_id);
    let _ = writeln!(report, "Message: {}", message.text);
    let _ = writeln!(report, "Error: {}", failure.describe());
    let _ = write!(report, "Reporting-site backtrace:\n{}", Backtrace::force_capture());
    report
}

/// Message dispatcher - routes messages to command bodies
pub struct MessageDispatcher {
    services: Arc<BotServices>,
    operator_channel: Option<String>,
}

impl MessageDispatcher {
    pub fn new(services: Arc<BotServices>, operator_channel: Option<String>) -> Self {
        Self {
            services,
            operator_channel,
        }
    }

    pub fn services(&self) -> &Arc<BotServices> {
        &self.services
    }

    /// Run one message through the pipeline
    #[tracing::instrument(
        skip(self, message),
        fields(message = %message.id, actor = %message.actor.id, tenant = ?message.tenant_id)
    )]
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        if self.services.shutdown.is_cancelled() {
            tracing::debug!("Shutting down, message dropped");
            return DispatchOutcome::Ignored;
        }

        let tenant_id = message.tenant_id.as_deref();
        let prefix = match self.services.prefix_for(tenant_id).await {
            Ok(prefix) => prefix,
            Err(e) => {
                tracing::warn!("Prefix lookup failed, using default: {}", e);
                self.services.parser.default_prefix().to_string()
            }
        };

        let Some(call) = self.services.parser.split(&message.text, &prefix) else {
            return DispatchOutcome::Ignored;
        };
        let command = match self.services.registry.lookup_command(call.name) {
            Ok(command) => command,
            Err(_) => {
                tracing::debug!(name = call.name, "Unknown command");
                return DispatchOutcome::Ignored;
            }
        };
        tracing::debug!(command = %command.name, "Matched command");

        if !command.scope.allows(tenant_id.is_some()) {
            self.reply(&message, &format!("`{}` can't be used here.", command.name))
                .await;
            return DispatchOutcome::Rejected(Rejection::WrongScope);
        }

        if let Some(tenant_id) = tenant_id {
            if let Err(e) = self.services.enablement.ensure_defaults(tenant_id).await {
                return self.fail(&message, Some(&command), Failure::Storage(e)).await;
            }

            match self
                .services
                .enablement
                .is_command_enabled(tenant_id, &command.name)
                .await
            {
                Ok(CommandState::Enabled) => {}
                Ok(CommandState::Disabled(reason)) => {
                    let text = match &reason {
                        DisabledReason::PluginDisabled(plugin) => format!(
                            "`{}` is unavailable because the `{}` plugin is disabled here.",
                            command.name, plugin
                        ),
                        DisabledReason::CommandDisabled => format!("`{}` is disabled here.", command.name),
                    };
                    self.reply(&message, &text).await;
                    return DispatchOutcome::Rejected(Rejection::Disabled(reason));
                }
                Err(e) => {
                    let failure = match e {
                        EnablementError::Storage(e) => Failure::Storage(e),
                        other => Failure::Misconfigured(other.to_string()),
                    };
                    return self.fail(&message, Some(&command), failure).await;
                }
            }
        }

        let tenant_owner = match tenant_id {
            Some(tenant_id) => self.services.gateway.tenant_owner(tenant_id).await.unwrap_or_else(|e| {
                tracing::warn!("Tenant owner lookup failed: {}", e);
                None
            }),
            None => None,
        };
        match self
            .services
            .permissions
            .authorize(&command, &message.actor, tenant_id, tenant_owner.as_deref())
            .await
        {
            Ok(()) => {}
            Err(PermissionError::Storage(e)) => {
                return self.fail(&message, Some(&command), Failure::Storage(e)).await;
            }
            Err(PermissionError::UndeclaredLevel(level)) => {
                let failure = Failure::Misconfigured(format!(
                    "command `{}` requires undeclared level `{}`",
                    command.name, level
                ));
                return self.fail(&message, Some(&command), failure).await;
            }
            Err(_) => {
                tracing::info!(command = %command.name, "Permission denied");
                self.reply(&message, "You can't use that command here.").await;
                return DispatchOutcome::Rejected(Rejection::PermissionDenied);
            }
        }

        let context = InvocationContext::from(&message);
        let invocation = match self
            .services
            .parser
            .parse_invocation(command.clone(), call.rest, context)
        {
            Ok(ParseOutcome::Parsed(invocation)) => invocation,
            Ok(ParseOutcome::Help) => {
                self.reply(&message, &command_help(&command, &prefix)).await;
                return DispatchOutcome::Help;
            }
            Err(e) => {
                let text = format!("{}\nUsage: {}", e, command.usage(&prefix));
                self.reply(&message, &text).await;
                return DispatchOutcome::Rejected(Rejection::Invalid(e));
            }
        };

        let Some(handler) = command.handler.clone() else {
            let failure = Failure::Misconfigured(format!("command `{}` has no handler", command.name));
            return self.fail(&message, Some(&command), failure).await;
        };

        let ctx = CommandContext::new(invocation, self.services.clone());
        match tokio::spawn(handler(ctx)).await {
            Ok(Ok(Some(reply))) => {
                self.reply(&message, &reply).await;
                DispatchOutcome::Completed
            }
            Ok(Ok(None)) => DispatchOutcome::Completed,
            Ok(Err(e)) => self.fail(&message, Some(&command), Failure::Command(e)).await,
            Err(join) if join.is_panic() => {
                let failure = Failure::Panic(panic_message(join.into_panic()));
                self.fail(&message, Some(&command), failure).await
            }
            Err(join) => {
                let failure = Failure::Panic(format!("command task aborted: {}", join));
                self.fail(&message, Some(&command), failure).await
            }
        }
    }

    async fn reply(&self, message: &InboundMessage, content: &str) {
        if let Err(e) = self.services.gateway.send(&message.channel_id, content).await {
            tracing::warn!(channel = %message.channel_id, "Failed to send reply: {}", e);
        }
    }

    /// One operator report and one apology per failure
    async fn fail(&self, message: &InboundMessage, command: Option<&Command>, failure: Failure) -> DispatchOutcome {
        let incident = Uuid::new_v4().to_string();
        let description = failure.describe();

        tracing::error!(
            incident = %incident,
            kind = failure.kind(),
            command = command.map(|c| c.name.as_str()).unwrap_or("-"),
            raw = %message.text,
            "Invocation failed: {}",
            description
        );

        let report = incident_report(&incident, &failure, message, command);

        match &self.operator_channel {
            Some(channel) => {
                if let Err(e) = self.services.gateway.send(channel, &report).await {
                    tracing::error!(incident = %incident, "Failed to notify operator: {}", e);
                }
            }
            None => tracing::warn!(incident = %incident, "No operator channel configured:\n{}", report),
        }

        self.reply(message, &failure.apology(&incident)).await;
        DispatchOutcome::Failed { incident }
    }
}
