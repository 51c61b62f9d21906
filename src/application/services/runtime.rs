//! Bot lifecycle: startup, the dispatch loop and graceful shutdown

use std::sync::Arc;

use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::errors::BotError;
use crate::application::messaging::{DispatchOutcome, MessageDispatcher};
use crate::domain::entities::{InboundMessage, PluginDefinition};
use crate::domain::traits::{ChatGateway, StorageBackend};
use crate::infrastructure::config::Config;
use crate::infrastructure::storage::{create_backend, CachedStore};
use crate::plugins::{self, PluginRegistry};

use super::BotServices;

/// A started bot: gateway connected, plugins registered, defaults seeded
pub struct BotRuntime {
    services: Arc<BotServices>,
    dispatcher: Arc<MessageDispatcher>,
    tracker: TaskTracker,
    finished: OnceCell<()>,
}

impl BotRuntime {
    /// Start with the built-in plugins and the configured storage backend.
    ///
    /// An unknown or unreachable backend is fatal here.
    pub async fn start(config: &Config, gateway: Arc<dyn ChatGateway>) -> Result<Self, BotError> {
        let backend = create_backend(&config.storage).await?;
        Self::start_with(config, gateway, backend, plugins::builtin(&config.bot.prefix)).await
    }

    /// Start with an explicit backend and plugin set
    pub async fn start_with(
        config: &Config,
        gateway: Arc<dyn ChatGateway>,
        backend: Arc<dyn StorageBackend>,
        definitions: Vec<PluginDefinition>,
    ) -> Result<Self, BotError> {
        let mut registry = PluginRegistry::new();
        for level in &config.permissions.levels {
            registry.declare_level(level.clone());
        }
        for definition in definitions {
            registry.register(definition)?;
        }
        for (command, level) in registry.undeclared_levels() {
            tracing::warn!(command = %command, level = %level, "Command requires an undeclared level");
        }
        tracing::info!(
            plugins = registry.len(),
            commands = registry.commands().len(),
            "Registry ready"
        );

        let store = Arc::new(CachedStore::new(backend, config.storage.cache_ttl()));
        tracing::info!(backend = store.backend_name(), ttl = ?store.ttl(), "Data store ready");

        let services = Arc::new(BotServices::new(
            Arc::new(registry),
            store,
            gateway.clone(),
            config.bot.prefix.clone(),
            config.bot.owner_id.clone(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            services.clone(),
            config.bot.operator_channel.clone(),
        ));

        let info = gateway.info();
        let tenants = gateway.connect().await?;
        tracing::info!(gateway = %info.name, platform = %info.platform, tenants = tenants.len(), "Gateway connected");

        for tenant in &tenants {
            if let Err(e) = services.enablement.ensure_defaults(tenant).await {
                // Retried on the tenant's first command.
                tracing::warn!(tenant = %tenant, "Default data bootstrap failed: {}", e);
            }
        }

        Ok(Self {
            services,
            dispatcher,
            tracker: TaskTracker::new(),
            finished: OnceCell::new(),
        })
    }

    pub fn services(&self) -> &Arc<BotServices> {
        &self.services
    }

    /// Cancelling this token starts a graceful shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.services.shutdown.clone()
    }

    /// Dispatch one message inline
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        self.dispatcher.dispatch(message).await
    }

    /// Dispatch inbound messages, each on its own task, until shutdown is
    /// requested or the channel closes; then shut down.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) -> Result<(), BotError> {
        let token = self.shutdown_token();
        tracing::info!("Dispatch loop started");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        let dispatcher = self.dispatcher.clone();
                        self.tracker.spawn(async move {
                            dispatcher.dispatch(message).await;
                        });
                    }
                    None => {
                        tracing::info!("Inbound channel closed");
                        break;
                    }
                },
            }
        }

        self.finish().await
    }

    /// Stop matching new messages, wait for in-flight invocations, then disconnect
    pub async fn shutdown(&self) -> Result<(), BotError> {
        self.services.shutdown.cancel();
        self.finish().await
    }

    /// Runs the teardown once; concurrent callers wait for the first one
    async fn finish(&self) -> Result<(), BotError> {
        self.finished.get_or_try_init(|| self.teardown()).await?;
        Ok(())
    }

    async fn teardown(&self) -> Result<(), BotError> {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Waiting for in-flight commands");
        self.tracker.wait().await;
        self.services.shutdown.cancel();

        if let Err(e) = self.services.store.close().await {
            tracing::error!("Failed to close storage: {}", e);
        }
        self.services.gateway.disconnect().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
