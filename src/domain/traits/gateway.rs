use async_trait::async_trait;

use crate::application::errors::GatewayError;

/// ChatGateway trait - abstraction over the chat platform transport.
///
/// Inbound messages are not pulled through this trait; the transport pushes
/// them into the channel handed to [`BotRuntime::run`].
///
/// [`BotRuntime::run`]: crate::application::services::BotRuntime::run
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Open the connection. Returns the tenants visible at connect time.
    async fn connect(&self) -> Result<Vec<String>, GatewayError>;

    /// Send a message to a channel
    async fn send(&self, channel_id: &str, content: &str) -> Result<DeliveryReceipt, GatewayError>;

    /// Owner of a tenant, if the platform knows one
    async fn tenant_owner(&self, tenant_id: &str) -> Result<Option<String>, GatewayError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), GatewayError>;

    /// Get gateway info
    fn info(&self) -> GatewayInfo;
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

impl DeliveryReceipt {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// Gateway information
#[derive(Debug, Clone)]
pub struct GatewayInfo {
    pub id: String,
    pub name: String,
    pub platform: String,
}
