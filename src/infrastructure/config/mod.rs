//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    /// Process owner; bypasses every permission check
    pub owner_id: String,
    /// Channel that receives failure reports
    pub operator_channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// One of `memory`, `json`, `sqlite`
    pub backend: String,
    pub path: PathBuf,
    pub cache_ttl_seconds: u64,
}

impl StorageConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PermissionsConfig {
    /// Levels declared in addition to those plugins declare
    #[serde(default)]
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub console: Option<ConsoleConfig>,
}

/// Identity the console gateway stamps on every line it reads
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub actor_id: String,
    #[serde(default)]
    pub role_ids: Vec<String>,
    /// Leave unset to simulate direct messages
    pub tenant_id: Option<String>,
    pub tenant_owner_id: Option<String>,
    pub channel_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "guildbot".to_string(),
                prefix: "!".to_string(),
                owner_id: "owner".to_string(),
                operator_channel: Some("operator".to_string()),
            },
            storage: StorageConfig {
                backend: "sqlite".to_string(),
                path: PathBuf::from("guildbot.db"),
                cache_ttl_seconds: 300,
            },
            permissions: PermissionsConfig {
                levels: vec!["moderator".to_string()],
            },
            logging: LoggingConfig::default(),
            adapters: AdaptersConfig {
                console: Some(ConsoleConfig {
                    enabled: true,
                    actor_id: "owner".to_string(),
                    role_ids: Vec::new(),
                    tenant_id: Some("console-guild".to_string()),
                    tenant_owner_id: Some("owner".to_string()),
                    channel_id: "console".to_string(),
                }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let path = path.into();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.prefix".to_string()));
        }
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "bot.prefix must not contain whitespace: {:?}",
                self.bot.prefix
            )));
        }
        if self.bot.owner_id.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.owner-id".to_string()));
        }
        if self.storage.cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "storage.cache-ttl-seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment variables win over file values
    pub fn apply_env(&mut self) {
        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(owner) = std::env::var("BOT_OWNER_ID") {
            self.bot.owner_id = owner;
        }

        if let Ok(channel) = std::env::var("BOT_OPERATOR_CHANNEL") {
            self.bot.operator_channel = Some(channel);
        }

        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(path) = std::env::var("STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
    }
}
