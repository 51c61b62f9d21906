//! Permission resolution and level membership

use std::sync::Arc;

use crate::application::errors::{PermissionError, StorageError};
use crate::domain::entities::{Actor, Command, LevelMembership, PermissionTarget};
use crate::infrastructure::storage::CachedStore;
use crate::plugins::PluginRegistry;

/// Entity type under which level memberships are stored, keyed by level name
pub const PERMISSIONS_ENTITY: &str = "permissions";

/// Decides whether an actor may run a command and manages level membership
pub struct PermissionService {
    store: Arc<CachedStore>,
    registry: Arc<PluginRegistry>,
    owner_id: String,
}

impl PermissionService {
    pub fn new(store: Arc<CachedStore>, registry: Arc<PluginRegistry>, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            registry,
            owner_id: owner_id.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Check `actor` against `command` inside `tenant_id`.
    ///
    /// Evaluation order: owner-only gate, process owner, tenant owner,
    /// unrestricted commands, then membership of any one required level.
    /// Required levels are OR-ed; there is no way to require all of them.
    pub async fn authorize(
        &self,
        command: &Command,
        actor: &Actor,
        tenant_id: Option<&str>,
        tenant_owner: Option<&str>,
    ) -> Result<(), PermissionError> {
        if command.owner_only && actor.id != self.owner_id {
            return Err(PermissionError::Denied);
        }
        if actor.id == self.owner_id {
            return Ok(());
        }
        if tenant_owner == Some(actor.id.as_str()) {
            return Ok(());
        }
        if command.levels.is_empty() {
            return Ok(());
        }

        if let Some(level) = command.levels.iter().find(|l| !self.registry.is_level_declared(l)) {
            return Err(PermissionError::UndeclaredLevel(level.clone()));
        }

        // Levels only exist inside a tenant.
        let Some(tenant_id) = tenant_id else {
            return Err(PermissionError::Denied);
        };

        for level in &command.levels {
            let membership = self.get_permissions_data(tenant_id, level).await?;
            if membership.admits(&actor.id, &actor.role_ids) {
                tracing::debug!(tenant = tenant_id, actor = %actor.id, level = %level, "Granted by level");
                return Ok(());
            }
        }

        Err(PermissionError::Denied)
    }

    fn declared(&self, level: &str) -> Result<String, PermissionError> {
        let level = level.to_lowercase();
        if self.registry.is_level_declared(&level) {
            Ok(level)
        } else {
            Err(PermissionError::UndeclaredLevel(level))
        }
    }

    /// Membership of `level` in `tenant_id`, created empty on first reference
    pub async fn get_permissions_data(&self, tenant_id: &str, level: &str) -> Result<LevelMembership, PermissionError> {
        let level = self.declared(level)?;
        if let Some(membership) = self
            .store
            .get_as::<LevelMembership>(PERMISSIONS_ENTITY, tenant_id, &level)
            .await?
        {
            return Ok(membership);
        }

        let empty = serde_json::to_value(LevelMembership::default()).map_err(StorageError::from)?;
        let (stored, created) = self
            .store
            .set_if_absent(PERMISSIONS_ENTITY, tenant_id, &level, empty)
            .await?;
        if created {
            tracing::debug!(tenant = tenant_id, level = %level, "Materialised empty level");
        }
        Ok(serde_json::from_value(stored).map_err(StorageError::from)?)
    }

    /// Replace the membership of `level` wholesale
    pub async fn set_permissions_data(
        &self,
        tenant_id: &str,
        level: &str,
        data: &LevelMembership,
    ) -> Result<LevelMembership, PermissionError> {
        let level = self.declared(level)?;
        Ok(self.store.set_as(PERMISSIONS_ENTITY, tenant_id, &level, data).await?)
    }

    /// Add `target` to `level`; fails if it is already a member
    pub async fn grant(
        &self,
        tenant_id: &str,
        level: &str,
        target: &PermissionTarget,
    ) -> Result<LevelMembership, PermissionError> {
        let level = self.declared(level)?;
        let membership = self
            .store
            .update_as(PERMISSIONS_ENTITY, tenant_id, &level, |current: Option<LevelMembership>| {
                let mut membership = current.unwrap_or_default();
                if !membership.insert(target) {
                    return Err(PermissionError::AlreadyGranted {
                        level: level.clone(),
                        target: target.to_string(),
                    });
                }
                Ok(membership)
            })
            .await?;

        tracing::info!(tenant = tenant_id, level = %level, target = %target, "Granted level");
        Ok(membership)
    }

    /// Remove `target` from `level`; fails if it is not a member
    pub async fn revoke(
        &self,
        tenant_id: &str,
        level: &str,
        target: &PermissionTarget,
    ) -> Result<LevelMembership, PermissionError> {
        let level = self.declared(level)?;
        let membership = self
            .store
            .update_as(PERMISSIONS_ENTITY, tenant_id, &level, |current: Option<LevelMembership>| {
                let mut membership = current.unwrap_or_default();
                if !membership.remove(target) {
                    return Err(PermissionError::NotGranted {
                        level: level.clone(),
                        target: target.to_string(),
                    });
                }
                Ok(membership)
            })
            .await?;

        tracing::info!(tenant = tenant_id, level = %level, target = %target, "Revoked level");
        Ok(membership)
    }
}
