//! Deployment configuration loaded from a TOML file
//!
//! Generation settings are fixed per deployment and sent unchanged with every
//! completion request. Every field has a default, so the file is optional and
//! may list only what it overrides.
//!
//! # Example
//!
//! ```toml
//! [model]
//! name = "gpt-3.5-turbo-0125"
//! max_reply_tokens = 1000
//! temperature = 0.8
//! stop = ["Human:", "AI:"]
//!
//! [client]
//! timeout_secs = 60
//! retries = 3
//!
//! [sessions]
//! idle_ttl_secs = 1800
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::ConfigError;

/// Longest pause between two completion attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

const MAX_BACKOFF: f64 = 10.0;

/// Root deployment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Completion model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// HTTP client behaviour
    #[serde(default)]
    pub client: ClientSettings,

    /// Lifetime of idle sessions
    #[serde(default)]
    pub sessions: SessionSettings,
}

impl DeploymentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DeploymentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Validation("model.name must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Validation(format!(
                "model.temperature must be within 0..=2, got {}",
                self.model.temperature
            )));
        }
        let client = &self.client;
        if !client.backoff.is_finite() || !(1.0..=MAX_BACKOFF).contains(&client.backoff) {
            return Err(ConfigError::Validation(format!(
                "client.backoff must be within 1..={MAX_BACKOFF}, got {}",
                client.backoff
            )));
        }
        let max_cooldown = MAX_RETRY_DELAY.as_secs_f64();
        if !client.cooldown_secs.is_finite()
            || !(0.0..=max_cooldown).contains(&client.cooldown_secs)
        {
            return Err(ConfigError::Validation(format!(
                "client.cooldown_secs must be within 0..={max_cooldown}, got {}",
                client.cooldown_secs
            )));
        }
        if self.sessions.idle_ttl_secs == 0 || self.sessions.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sessions.idle_ttl_secs and sessions.sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Completion model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the provider
    #[serde(default = "default_model")]
    pub name: String,

    /// Context window of the model. Conversations are never trimmed to fit;
    /// exceeding it only logs a warning and the provider decides.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// Upper bound on the reply length
    #[serde(default = "default_max_reply_tokens")]
    pub max_reply_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,

    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,

    /// Sequences that end generation early
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
}

fn default_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}

fn default_max_input_tokens() -> usize {
    4000
}

fn default_max_reply_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.8
}

fn default_penalty() -> f32 {
    1.0
}

fn default_stop() -> Vec<String> {
    vec!["Human:".to_string(), "AI:".to_string()]
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            max_input_tokens: default_max_input_tokens(),
            max_reply_tokens: default_max_reply_tokens(),
            temperature: default_temperature(),
            frequency_penalty: default_penalty(),
            presence_penalty: default_penalty(),
            stop: default_stop(),
        }
    }
}

/// HTTP client behaviour towards the completion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a retryable failure
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause before the first retry, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,

    /// Multiplier applied to the pause after each retry
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_cooldown_secs() -> f64 {
    2.0
}

fn default_backoff() -> f64 {
    1.5
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            cooldown_secs: default_cooldown_secs(),
            backoff: default_backoff(),
        }
    }
}

/// Idle session expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Sessions untouched for this long are dropped
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    /// How often expired sessions are looked for
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_ttl_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl SessionSettings {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
