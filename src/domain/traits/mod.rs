//! Domain traits - Abstractions for infrastructure implementations

pub mod gateway;
pub mod store;

pub use gateway::{ChatGateway, DeliveryReceipt, GatewayInfo};
pub use store::StorageBackend;
