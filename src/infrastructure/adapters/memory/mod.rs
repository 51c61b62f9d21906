//! In-process gateway that records every send

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::application::errors::GatewayError;
use crate::domain::traits::{ChatGateway, DeliveryReceipt, GatewayInfo};

/// A message handed to [`MemoryGateway::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub content: String,
}

/// Gateway with no transport: tenants and owners are set up front and sends
/// are kept in order for inspection.
#[derive(Default)]
pub struct MemoryGateway {
    tenants: Vec<String>,
    owners: HashMap<String, String>,
    sent: Mutex<Vec<SentMessage>>,
    connected: AtomicBool,
    disconnects: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tenant reported at connect time
    pub fn with_tenant(mut self, tenant_id: impl Into<String>, owner_id: Option<&str>) -> Self {
        let tenant_id = tenant_id.into();
        if let Some(owner) = owner_id {
            self.owners.insert(tenant_id.clone(), owner.to_string());
        }
        self.tenants.push(tenant_id);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// How many times `disconnect` was called
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Contents sent to one channel, oldest first
    pub fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl ChatGateway for MemoryGateway {
    async fn connect(&self) -> Result<Vec<String>, GatewayError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.tenants.clone())
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<DeliveryReceipt, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(DeliveryReceipt::new(format!("memory-{}", sent.len())))
    }

    async fn tenant_owner(&self, tenant_id: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.owners.get(tenant_id).cloned())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn info(&self) -> GatewayInfo {
        GatewayInfo {
            id: "memory".to_string(),
            name: "guildbot".to_string(),
            platform: "memory".to_string(),
        }
    }
}
