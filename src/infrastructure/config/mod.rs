//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    /// Transport credential; scrubbed once the session is established
    #[serde(default)]
    pub token: Option<String>,
    /// Receives lifecycle notices and error reports
    pub owner: String,
    /// Directory holding one audit file per event
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Long-poll timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: i64,
}

fn default_poll_timeout() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                token: None,
                owner: "console".to_string(),
                log_path: PathBuf::from("logs"),
            },
            adapters: AdaptersConfig {
                telegram: Some(TelegramConfig {
                    enabled: false,
                    poll_timeout: default_poll_timeout(),
                }),
                console: Some(ConsoleConfig {
                    enabled: true,
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

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            config.bot.token = Some(token);
            if let Some(ref mut tg) = config.adapters.telegram {
                tg.enabled = true;
            }
        }

        if let Ok(owner) = std::env::var("BOT_OWNER") {
            config.bot.owner = owner;
        }

        if let Ok(log_path) = std::env::var("BOT_LOG_PATH") {
            config.bot.log_path = PathBuf::from(log_path);
        }

        config
    }

    pub fn telegram_enabled(&self) -> bool {
        self.adapters.telegram.as_ref().is_some_and(|t| t.enabled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.owner.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.owner".to_string()));
        }
        if self.bot.log_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("bot.log-path".to_string()));
        }
        if self.telegram_enabled() {
            match self.bot.token.as_deref() {
                None => return Err(ConfigError::MissingField("bot.token".to_string())),
                Some(token) if token.trim().is_empty() => {
                    return Err(ConfigError::InvalidValue("bot.token is empty".to_string()))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
