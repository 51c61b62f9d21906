//! Application services - Business logic orchestration

pub mod bot_services;
pub mod command_service;
pub mod enablement_service;
pub mod permission_service;
pub mod runtime;

pub use bot_services::BotServices;
pub use enablement_service::{CommandState, DisabledReason, EnablementService};
pub use permission_service::PermissionService;
pub use runtime::BotRuntime;
