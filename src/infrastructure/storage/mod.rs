//! Storage backends and the cached data store in front of them

pub mod cache;
pub mod json;
pub mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::application::errors::StorageError;
use crate::domain::traits::StorageBackend;
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::database::SqliteBackend;

pub use cache::CachedStore;
pub use json::JsonFileBackend;
pub use memory::MemoryBackend;

/// The compile-time set of backends selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Json,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            _ => Err(StorageError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the backend named in configuration
pub async fn create_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let kind: BackendKind = config.backend.parse()?;
    tracing::info!(backend = %kind, path = %config.path.display(), "Opening storage backend");

    let backend: Arc<dyn StorageBackend> = match kind {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Json => {
            let store = JsonFileBackend::new(&config.path);
            store.init().await?;
            Arc::new(store)
        }
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(&config.path).await?),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn storage_config(backend: &str, path: PathBuf) -> StorageConfig {
        StorageConfig {
            backend: backend.to_string(),
            path,
            cache_ttl_seconds: 60,
        }
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(" SQLite ".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("json".parse::<BackendKind>().unwrap(), BackendKind::Json);
    }

    #[tokio::test]
    async fn test_unknown_backend_names_the_backend() {
        let config = storage_config("redis", PathBuf::from("unused"));
        let err = create_backend(&config).await.err().unwrap();
        match err {
            StorageError::UnknownBackend(name) => assert_eq!(name, "redis"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_factory_builds_each_backend() {
        let dir = tempfile::tempdir().unwrap();

        let memory = create_backend(&storage_config("memory", dir.path().into())).await.unwrap();
        assert_eq!(memory.name(), "memory");

        let json = create_backend(&storage_config("json", dir.path().join("json"))).await.unwrap();
        assert_eq!(json.name(), "json");

        let sqlite = create_backend(&storage_config("sqlite", dir.path().join("bot.db"))).await.unwrap();
        assert_eq!(sqlite.name(), "sqlite");
    }
}
