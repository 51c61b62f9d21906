//! File-based storage implementation

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::StorageBackend;

type Document = Map<String, Value>;

/// JSON file-based store.
///
/// Each `(entity_type, entity_id)` pair is one document at
/// `<base>/<entity_type>/<entity_id>.json` holding every keyword for that
/// entity. Documents are read lazily and rewritten whole on every set.
pub struct JsonFileBackend {
    base_path: PathBuf,
    documents: Arc<RwLock<HashMap<(String, String), Document>>>,
}

impl JsonFileBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn document_path(&self, entity_type: &str, entity_id: &str) -> PathBuf {
        self.base_path
            .join(encode_component(entity_type))
            .join(format!("{}.json", encode_component(entity_id)))
    }

    async fn read_document(path: &Path) -> Result<Document, StorageError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(path: &Path, document: &Document) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Keeps file names portable: anything outside `[A-Za-z0-9_-]` is hex-escaped
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn get(&self, entity_type: &str, entity_id: &str, keyword: &str) -> Result<Option<Value>, StorageError> {
        let doc_key = (entity_type.to_string(), entity_id.to_string());
        {
            let documents = self.documents.read().await;
            if let Some(doc) = documents.get(&doc_key) {
                return Ok(doc.get(keyword).cloned());
            }
        }

        let mut documents = self.documents.write().await;
        if !documents.contains_key(&doc_key) {
            let loaded = Self::read_document(&self.document_path(entity_type, entity_id)).await?;
            documents.insert(doc_key.clone(), loaded);
        }
        Ok(documents.get(&doc_key).and_then(|doc| doc.get(keyword).cloned()))
    }

    async fn set(&self, entity_type: &str, entity_id: &str, keyword: &str, value: Value) -> Result<Value, StorageError> {
        let doc_key = (entity_type.to_string(), entity_id.to_string());
        let path = self.document_path(entity_type, entity_id);

        let mut documents = self.documents.write().await;
        let mut doc = match documents.get(&doc_key) {
            Some(doc) => doc.clone(),
            None => Self::read_document(&path).await?,
        };
        doc.insert(keyword.to_string(), value);
        Self::write_document(&path, &doc).await?;

        let stored = doc.get(keyword).cloned().unwrap_or(Value::Null);
        documents.insert(doc_key, doc);
        Ok(stored)
    }
}
