//! Configuration types and loading.
//!
//! Values come from an optional JSON file (`config.json` by default) and then
//! from environment variables, which win. Everything is read once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::llm::{self, LlmConfig};
use crate::rate_limit;

/// Default path of the optional JSON config file.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Default path of the user database.
pub const DEFAULT_USERS_PATH: &str = "./users.json";

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Bot name for identification in logs.
    pub name: String,
    /// The only channel the bot answers in.
    pub channel_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            channel_id: String::new(),
        }
    }
}

/// Rate window settings for LLM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: rate_limit::DEFAULT_WINDOW,
            max_requests: rate_limit::DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Which chat surface to run on.
#[derive(Debug, Clone)]
pub enum ChannelKind {
    Discord { token: SecretString },
    Cli,
}

/// Shape of the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl FileConfig {
    /// Read the file at `path`. A missing file is not an error.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let parsed = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Ok(Some(parsed))
    }
}

/// Everything the process needs to start.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub agent: AgentConfig,
    pub channel: ChannelKind,
    pub llm: LlmConfig,
    pub users_path: PathBuf,
    pub rate_limit: RateLimitConfig,
}

impl BotConfig {
    /// Load from `$KHARABA_CONFIG` (or `./config.json`) and the process
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = env("KHARABA_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let file = FileConfig::read(Path::new(&path))?;
        Self::from_sources(file, env)
    }

    /// Build a config from an optional file and an env lookup.
    pub fn from_sources<F>(file: Option<FileConfig>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let lookup = |key: &str, from_file: &Option<String>| -> Option<String> {
            env(key)
                .or_else(|| from_file.clone())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = lookup("GEMINI_API_KEY", &file.gemini_api_key).ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "GEMINI_API_KEY".into(),
                hint: "Set it in the environment or as \"geminiApiKey\" in config.json.".into(),
            }
        })?;
        let model = lookup("KHARABA_MODEL", &file.model).unwrap_or_else(|| llm::DEFAULT_MODEL.into());

        let channel_mode = env("KHARABA_CHANNEL").unwrap_or_else(|| "discord".into());
        let (channel, channel_id) = match channel_mode.trim().to_ascii_lowercase().as_str() {
            "cli" => (ChannelKind::Cli, crate::channels::cli::CLI_CHANNEL_ID.to_string()),
            "discord" => {
                let token = lookup("DISCORD_BOT_TOKEN", &file.token).ok_or_else(|| {
                    ConfigError::MissingRequired {
                        key: "DISCORD_BOT_TOKEN".into(),
                        hint: "Set it in the environment or as \"token\" in config.json.".into(),
                    }
                })?;
                let channel_id = lookup("DISCORD_CHANNEL_ID", &file.channel_id).ok_or_else(|| {
                    ConfigError::MissingRequired {
                        key: "DISCORD_CHANNEL_ID".into(),
                        hint: "Set it in the environment or as \"channelId\" in config.json.".into(),
                    }
                })?;
                (
                    ChannelKind::Discord {
                        token: SecretString::from(token),
                    },
                    channel_id,
                )
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "KHARABA_CHANNEL".into(),
                    message: format!("expected \"discord\" or \"cli\", got \"{other}\""),
                });
            }
        };

        let window_secs: u64 = parse_env(&env, "KHARABA_RATE_WINDOW_SECS")?
            .unwrap_or(rate_limit::DEFAULT_WINDOW.as_secs());
        // A zero window resets on every call and would admit everything.
        if window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "KHARABA_RATE_WINDOW_SECS".into(),
                message: "window must be at least one second".into(),
            });
        }
        let max_requests: u32 =
            parse_env(&env, "KHARABA_RATE_MAX")?.unwrap_or(rate_limit::DEFAULT_MAX_REQUESTS);

        let users_path = env("KHARABA_USERS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_PATH));

        Ok(Self {
            agent: AgentConfig {
                channel_id,
                ..AgentConfig::default()
            },
            channel,
            llm: LlmConfig {
                api_key: SecretString::from(api_key),
                model,
                base_url: env("GEMINI_BASE_URL")
                    .unwrap_or_else(|| llm::gemini::DEFAULT_BASE_URL.to_string()),
            },
            users_path,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(window_secs),
                max_requests,
            },
        })
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("\"{raw}\": {e}"),
            }),
    }
}
