//! Application layer errors

use thiserror::Error;

/// Error type returned by command bodies and config actions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lookup failure that callers branch on instead of propagating
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Argument and flag validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required argument `{0}`")]
    MissingArgument(String),

    #[error("Flag `--{0}` expects a value")]
    MissingFlagValue(String),

    #[error("Flag `--{flag}` expects {expected}, got `{value}`")]
    InvalidFlagValue {
        flag: String,
        expected: &'static str,
        value: String,
    },

    #[error("Unknown flag `{0}`")]
    UnknownFlag(String),

    #[error("Unexpected argument `{0}`")]
    UnexpectedArgument(String),
}

/// Registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Command `{0}` is already registered")]
    DuplicateCommand(String),

    #[error("Plugin `{0}` is already registered")]
    DuplicatePlugin(String),

    #[error("Default setting `{keyword}` is already declared by plugin `{owner}`")]
    DuplicateDefault { keyword: String, owner: String },
}

/// Permission resolution and membership errors
#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Permission denied")]
    Denied,

    #[error("Permission level `{0}` was never declared")]
    UndeclaredLevel(String),

    #[error("`{target}` already holds level `{level}`")]
    AlreadyGranted { level: String, target: String },

    #[error("`{target}` does not hold level `{level}`")]
    NotGranted { level: String, target: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Plugin and command enablement errors
#[derive(Error, Debug)]
pub enum EnablementError {
    #[error("No plugin named `{0}`")]
    PluginNotFound(String),

    #[error("No command named `{0}`")]
    CommandNotFound(String),

    #[error("`{0}` cannot be disabled")]
    CannotDisable(String),

    #[error("`{0}` is already enabled")]
    AlreadyEnabled(String),

    #[error("`{0}` is already disabled")]
    AlreadyDisabled(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unknown storage backend `{0}`")]
    UnknownBackend(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Chat gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Not connected")]
    NotConnected,

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

