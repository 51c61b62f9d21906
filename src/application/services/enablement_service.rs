//! Per-tenant plugin and command enablement, plus default-data bootstrap

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::application::errors::{EnablementError, StorageError};
use crate::domain::entities::PluginRecord;
use crate::infrastructure::storage::CachedStore;
use crate::plugins::PluginRegistry;

pub const PLUGIN_ENABLED_ENTITY: &str = "plugin_enabled";
pub const COMMAND_ENABLED_ENTITY: &str = "command_enabled";
/// Entity type holding plugin default-data entries (e.g. `prefix`)
pub const SETTINGS_ENTITY: &str = "settings";

/// Why a command will not run in a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// The owning plugin is off; command overrides are not consulted
    PluginDisabled(String),
    CommandDisabled,
}

/// Resolved state of a command in one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandState {
    Enabled,
    Disabled(DisabledReason),
}

impl CommandState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, CommandState::Enabled)
    }
}

/// Enablement overrides and default-data bootstrap, stored through the cache
pub struct EnablementService {
    store: Arc<CachedStore>,
    registry: Arc<PluginRegistry>,
    bootstrapped: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl EnablementService {
    pub fn new(store: Arc<CachedStore>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            store,
            registry,
            bootstrapped: Mutex::new(HashMap::new()),
        }
    }

    fn plugin(&self, name: &str) -> Result<Arc<PluginRecord>, EnablementError> {
        self.registry
            .plugin(name)
            .ok_or_else(|| EnablementError::PluginNotFound(name.to_string()))
    }

    async fn plugin_state(&self, tenant_id: &str, plugin: &PluginRecord) -> Result<bool, StorageError> {
        if !plugin.can_be_disabled {
            return Ok(true);
        }
        let stored = self
            .store
            .get_as::<bool>(PLUGIN_ENABLED_ENTITY, tenant_id, &plugin.name.to_lowercase())
            .await?;
        Ok(stored.unwrap_or(plugin.enabled_by_default))
    }

    /// Plugins that cannot be disabled always report enabled, whatever is stored
    pub async fn is_plugin_enabled(&self, tenant_id: &str, name: &str) -> Result<bool, EnablementError> {
        let plugin = self.plugin(name)?;
        Ok(self.plugin_state(tenant_id, &plugin).await?)
    }

    /// Owning plugin first, then the command's own override, then its default
    pub async fn is_command_enabled(&self, tenant_id: &str, name: &str) -> Result<CommandState, EnablementError> {
        let command = self
            .registry
            .lookup_command(name)
            .map_err(|_| EnablementError::CommandNotFound(name.to_string()))?;
        let plugin = self.plugin(&command.plugin)?;

        if !self.plugin_state(tenant_id, &plugin).await? {
            return Ok(CommandState::Disabled(DisabledReason::PluginDisabled(plugin.name.clone())));
        }
        if !plugin.can_be_disabled {
            return Ok(CommandState::Enabled);
        }

        let enabled = self
            .store
            .get_as::<bool>(COMMAND_ENABLED_ENTITY, tenant_id, &command.name.to_lowercase())
            .await?
            .unwrap_or(command.enabled_by_default);

        Ok(if enabled {
            CommandState::Enabled
        } else {
            CommandState::Disabled(DisabledReason::CommandDisabled)
        })
    }

    pub async fn enable_plugin(&self, tenant_id: &str, name: &str) -> Result<(), EnablementError> {
        self.set_plugin(tenant_id, name, true).await
    }

    pub async fn disable_plugin(&self, tenant_id: &str, name: &str) -> Result<(), EnablementError> {
        self.set_plugin(tenant_id, name, false).await
    }

    async fn set_plugin(&self, tenant_id: &str, name: &str, enabled: bool) -> Result<(), EnablementError> {
        let plugin = self.plugin(name)?;
        if !plugin.can_be_disabled {
            return Err(EnablementError::CannotDisable(plugin.name.clone()));
        }

        let default = plugin.enabled_by_default;
        self.toggle(PLUGIN_ENABLED_ENTITY, tenant_id, &plugin.name, default, enabled)
            .await?;
        tracing::info!(tenant = tenant_id, plugin = %plugin.name, enabled, "Plugin toggled");
        Ok(())
    }

    pub async fn enable_command(&self, tenant_id: &str, name: &str) -> Result<(), EnablementError> {
        self.set_command(tenant_id, name, true).await
    }

    pub async fn disable_command(&self, tenant_id: &str, name: &str) -> Result<(), EnablementError> {
        self.set_command(tenant_id, name, false).await
    }

    async fn set_command(&self, tenant_id: &str, name: &str, enabled: bool) -> Result<(), EnablementError> {
        let command = self
            .registry
            .lookup_command(name)
            .map_err(|_| EnablementError::CommandNotFound(name.to_string()))?;
        let plugin = self.plugin(&command.plugin)?;
        if !plugin.can_be_disabled {
            return Err(EnablementError::CannotDisable(command.name.clone()));
        }

        self.toggle(COMMAND_ENABLED_ENTITY, tenant_id, &command.name, command.enabled_by_default, enabled)
            .await?;
        tracing::info!(tenant = tenant_id, command = %command.name, enabled, "Command toggled");
        Ok(())
    }

    /// Serialised flip of a stored override; refuses to write the state it already has
    async fn toggle(
        &self,
        entity_type: &str,
        tenant_id: &str,
        name: &str,
        default: bool,
        enabled: bool,
    ) -> Result<bool, EnablementError> {
        self.store
            .update_as(entity_type, tenant_id, &name.to_lowercase(), |current: Option<bool>| {
                match (current.unwrap_or(default), enabled) {
                    (true, true) => Err(EnablementError::AlreadyEnabled(name.to_string())),
                    (false, false) => Err(EnablementError::AlreadyDisabled(name.to_string())),
                    _ => Ok(enabled),
                }
            })
            .await
    }

    /// Run [`bootstrap_defaults`](Self::bootstrap_defaults) once per tenant.
    ///
    /// Concurrent first contacts wait on the same bootstrap. A failed
    /// bootstrap is retried by the next caller.
    pub async fn ensure_defaults(&self, tenant_id: &str) -> Result<(), StorageError> {
        let cell = {
            let mut bootstrapped = self.bootstrapped.lock();
            bootstrapped
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_try_init(|| async {
            let written = self.bootstrap_defaults(tenant_id).await?;
            tracing::debug!(tenant = tenant_id, written, "Default data ready");
            Ok::<_, StorageError>(())
        })
        .await?;
        Ok(())
    }

    /// Write every plugin's default entries that have no stored value yet.
    ///
    /// Returns how many entries were written; a second run writes none.
    pub async fn bootstrap_defaults(&self, tenant_id: &str) -> Result<usize, StorageError> {
        let mut written = 0;
        for plugin in self.registry.plugins() {
            for entry in &plugin.defaults {
                let (_, created) = self
                    .store
                    .set_if_absent(SETTINGS_ENTITY, tenant_id, &entry.keyword, entry.value.clone())
                    .await?;
                if created {
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Command, PluginDefinition};
    use crate::infrastructure::storage::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (EnablementService, Arc<CachedStore>) {
        let mut registry = PluginRegistry::new();
        registry
            .register(
                PluginDefinition::new("core")
                    .always_enabled()
                    .with_default("prefix", "!")
                    .with_command(Command::new("help")),
            )
            .unwrap();
        registry
            .register(
                PluginDefinition::new("fun")
                    .with_default("greeting", "hi")
                    .with_command(Command::new("joke"))
                    .with_command(Command::new("roast").disabled_by_default()),
            )
            .unwrap();
        registry
            .register(PluginDefinition::new("beta").disabled_by_default())
            .unwrap();

        let store = Arc::new(CachedStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60)));
        (EnablementService::new(store.clone(), Arc::new(registry)), store)
    }

    #[tokio::test]
    async fn test_plugin_defaults() {
        let (svc, _) = setup();
        assert!(svc.is_plugin_enabled("g1", "fun").await.unwrap());
        assert!(!svc.is_plugin_enabled("g1", "beta").await.unwrap());
        assert!(matches!(
            svc.is_plugin_enabled("g1", "nope").await,
            Err(EnablementError::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_core_ignores_stored_override() {
        let (svc, store) = setup();
        store.set(PLUGIN_ENABLED_ENTITY, "g1", "core", json!(false)).await.unwrap();

        assert!(svc.is_plugin_enabled("g1", "core").await.unwrap());
        assert_eq!(svc.is_command_enabled("g1", "help").await.unwrap(), CommandState::Enabled);
        assert!(matches!(
            svc.disable_plugin("g1", "core").await,
            Err(EnablementError::CannotDisable(_))
        ));
        assert!(matches!(
            svc.disable_command("g1", "help").await,
            Err(EnablementError::CannotDisable(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_plugin_overrides_command() {
        let (svc, _) = setup();
        svc.enable_command("g1", "roast").await.unwrap();
        svc.disable_plugin("g1", "fun").await.unwrap();

        assert_eq!(
            svc.is_command_enabled("g1", "roast").await.unwrap(),
            CommandState::Disabled(DisabledReason::PluginDisabled("fun".into()))
        );
        // Other tenants keep their own state.
        assert!(svc.is_command_enabled("g2", "joke").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_command_override_and_default() {
        let (svc, _) = setup();
        assert_eq!(
            svc.is_command_enabled("g1", "roast").await.unwrap(),
            CommandState::Disabled(DisabledReason::CommandDisabled)
        );

        svc.enable_command("g1", "roast").await.unwrap();
        svc.disable_command("g1", "joke").await.unwrap();

        assert!(svc.is_command_enabled("g1", "roast").await.unwrap().is_enabled());
        assert!(!svc.is_command_enabled("g1", "joke").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_toggle_to_current_state_conflicts() {
        let (svc, _) = setup();
        assert!(matches!(
            svc.enable_plugin("g1", "fun").await,
            Err(EnablementError::AlreadyEnabled(_))
        ));
        svc.disable_command("g1", "joke").await.unwrap();
        assert!(matches!(
            svc.disable_command("g1", "joke").await,
            Err(EnablementError::AlreadyDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let (svc, store) = setup();

        assert_eq!(svc.bootstrap_defaults("g1").await.unwrap(), 2);
        store.set(SETTINGS_ENTITY, "g1", "prefix", json!("?")).await.unwrap();
        assert_eq!(svc.bootstrap_defaults("g1").await.unwrap(), 0);

        assert_eq!(store.get(SETTINGS_ENTITY, "g1", "prefix").await.unwrap(), Some(json!("?")));
        assert_eq!(store.get(SETTINGS_ENTITY, "g1", "greeting").await.unwrap(), Some(json!("hi")));
    }

    #[tokio::test]
    async fn test_ensure_defaults_runs_once() {
        let (svc, store) = setup();
        let svc = Arc::new(svc);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.ensure_defaults("g1").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        store.set(SETTINGS_ENTITY, "g1", "greeting", json!("yo")).await.unwrap();
        svc.ensure_defaults("g1").await.unwrap();
        assert_eq!(store.get(SETTINGS_ENTITY, "g1", "greeting").await.unwrap(), Some(json!("yo")));
    }
}
