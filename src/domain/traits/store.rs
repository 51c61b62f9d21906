use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::StorageError;

/// StorageBackend trait - abstraction for tenant-scoped data persistence.
///
/// Values are addressed by `(entity_type, entity_id, keyword)`; for tenant
/// data the entity id is the tenant id.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    async fn get(
        &self,
        entity_type: &str,
        entity_id: &str,
        keyword: &str,
    ) -> Result<Option<Value>, StorageError>;

    /// Persist a value and return what was actually stored
    async fn set(
        &self,
        entity_type: &str,
        entity_id: &str,
        keyword: &str,
        value: Value,
    ) -> Result<Value, StorageError>;

    /// Flush any buffered state. Called once during shutdown.
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
