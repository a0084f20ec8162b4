//! Application configuration

pub mod deployment;
pub mod personas;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use deployment::{
    ClientSettings, DeploymentConfig, ModelConfig, SessionSettings, MAX_RETRY_DELAY,
};
pub use personas::Persona;

/// Environment variables that must be present before the server starts
pub const REQUIRED_ENV: [&str; 3] = ["OPENAI_API_KEY", "OPENAI_API_BASE", "OPENAI_API_TYPE"];

const DEFAULT_API_VERSION: &str = "2023-05-15";

/// Flavour of the OpenAI-compatible endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    OpenAi,
    Azure,
}

impl ApiType {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "open_ai" | "openai" => Ok(ApiType::OpenAi),
            "azure" => Ok(ApiType::Azure),
            other => Err(ConfigError::Validation(format!(
                "OPENAI_API_TYPE must be 'open_ai' or 'azure', got '{other}'"
            ))),
        }
    }
}

/// Where and how to reach the completion provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub api_type: ApiType,
    /// Azure deployment name
    pub engine: Option<String>,
    /// Azure API version
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub provider: ProviderConfig,
    pub deployment: DeploymentConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| env::var(key).ok())?;

        if let Some(path) = env::var_os("PERSONA_CHAT_CONFIG").map(PathBuf::from) {
            tracing::info!("Loading deployment config from {}", path.display());
            config.deployment = DeploymentConfig::from_file(&path)?;
        }

        Ok(config)
    }

    /// Build configuration from a key lookup. Every missing required key is
    /// reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_ENV
            .iter()
            .filter(|&&key| present(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let api_type = ApiType::parse(&present("OPENAI_API_TYPE").unwrap_or_default())?;
        let engine = present("OPENAI_ENGINE");
        if api_type == ApiType::Azure && engine.is_none() {
            return Err(ConfigError::Missing(vec!["OPENAI_ENGINE".to_string()]));
        }

        let port = match present("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| ConfigError::Validation(format!("PORT is not a valid port: {p}")))?,
            None => 3000,
        };

        Ok(Self {
            host: present("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            provider: ProviderConfig {
                api_key: present("OPENAI_API_KEY").unwrap_or_default(),
                api_base: present("OPENAI_API_BASE")
                    .unwrap_or_default()
                    .trim_end_matches('/')
                    .to_string(),
                api_type,
                engine,
                api_version: present("OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_API_VERSION.into()),
            },
            deployment: DeploymentConfig::default(),
        })
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
