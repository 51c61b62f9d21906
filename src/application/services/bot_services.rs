//! Shared services handed to the dispatcher and every command body

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::errors::StorageError;
use crate::application::messaging::parser::MessageParser;
use crate::domain::traits::ChatGateway;
use crate::infrastructure::storage::CachedStore;
use crate::plugins::PluginRegistry;

use super::enablement_service::{EnablementService, SETTINGS_ENTITY};
use super::permission_service::PermissionService;

/// Default-data keyword holding a tenant's command prefix
pub const PREFIX_KEYWORD: &str = "prefix";

pub struct BotServices {
    pub registry: Arc<PluginRegistry>,
    pub store: Arc<CachedStore>,
    pub permissions: PermissionService,
    pub enablement: EnablementService,
    pub gateway: Arc<dyn ChatGateway>,
    pub parser: MessageParser,
    /// Raised once; after that no new message is matched to a command
    pub shutdown: CancellationToken,
}

impl BotServices {
    pub fn new(
        registry: Arc<PluginRegistry>,
        store: Arc<CachedStore>,
        gateway: Arc<dyn ChatGateway>,
        prefix: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            permissions: PermissionService::new(store.clone(), registry.clone(), owner_id),
            enablement: EnablementService::new(store.clone(), registry.clone()),
            parser: MessageParser::new(prefix),
            shutdown: CancellationToken::new(),
            registry,
            store,
            gateway,
        }
    }

    pub fn is_owner(&self, actor_id: &str) -> bool {
        self.permissions.owner_id() == actor_id
    }

    /// Command prefix for a tenant; direct messages use the configured one
    pub async fn prefix_for(&self, tenant_id: Option<&str>) -> Result<String, StorageError> {
        let Some(tenant_id) = tenant_id else {
            return Ok(self.parser.default_prefix().to_string());
        };
        let stored = self
            .store
            .get_as::<String>(SETTINGS_ENTITY, tenant_id, PREFIX_KEYWORD)
            .await?;
        Ok(stored
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.parser.default_prefix().to_string()))
    }

    pub async fn set_prefix(&self, tenant_id: &str, prefix: &str) -> Result<String, StorageError> {
        self.store
            .set_as(SETTINGS_ENTITY, tenant_id, PREFIX_KEYWORD, &prefix.to_string())
            .await
    }
}
