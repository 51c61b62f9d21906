//! Process-local storage backend

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::traits::StorageBackend;

type Key = (String, String, String);

/// In-memory backend. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<Key, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

fn key(entity_type: &str, entity_id: &str, keyword: &str) -> Key {
    (entity_type.to_string(), entity_id.to_string(), keyword.to_string())
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.read().get(&key(entity_type, entity_id, keyword)).cloned())
    }

    async fn set(&self, entity_type: &str, entity_id: &str, keyword: &str, value: Value) -> Result<Value, StorageError> {
        self.values
            .write()
            .insert(key(entity_type, entity_id, keyword), value.clone());
        Ok(value)
    }
}
