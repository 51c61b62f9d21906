//! Console adapter for development/testing
//!
//! Every stdin line becomes an inbound message from the configured actor;
//! replies are printed to stdout.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::errors::GatewayError;
use crate::domain::entities::{Actor, InboundMessage};
use crate::domain::traits::{ChatGateway, DeliveryReceipt, GatewayInfo};
use crate::infrastructure::config::ConsoleConfig;

/// Console gateway for local development
pub struct ConsoleGateway {
    info: GatewayInfo,
    config: ConsoleConfig,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl ConsoleGateway {
    pub fn new(bot_name: impl Into<String>, config: ConsoleConfig) -> Self {
        Self {
            info: GatewayInfo {
                id: "console".to_string(),
                name: bot_name.into(),
                platform: "console".to_string(),
            },
            config,
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn actor(&self) -> Actor {
        Actor::new(&self.config.actor_id)
            .with_username(&self.config.actor_id)
            .with_roles(self.config.role_ids.iter().cloned())
    }

    /// Spawn the stdin reader. The channel closes at end of input or when
    /// `shutdown` is cancelled.
    pub fn spawn_reader(&self, shutdown: CancellationToken) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(64);
        let actor = self.actor();
        let tenant_id = self.config.tenant_id.clone();
        let channel_id = self.config.channel_id.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    () = shutdown.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let message = InboundMessage::new(line, actor.clone(), tenant_id.clone(), channel_id.clone());
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl ChatGateway for ConsoleGateway {
    async fn connect(&self) -> Result<Vec<String>, GatewayError> {
        tracing::info!("Starting console gateway (dev mode)");
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.config.tenant_id.iter().cloned().collect())
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<DeliveryReceipt, GatewayError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        println!("[BOT -> #{}] {}", channel_id, content);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt::new(format!("console-{}", id)))
    }

    async fn tenant_owner(&self, tenant_id: &str) -> Result<Option<String>, GatewayError> {
        if self.config.tenant_id.as_deref() == Some(tenant_id) {
            Ok(self.config.tenant_owner_id.clone())
        } else {
            Ok(None)
        }
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Console gateway disconnected");
        Ok(())
    }

    fn info(&self) -> GatewayInfo {
        self.info.clone()
    }
}
