//! Retry decorator for completion clients

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ClientSettings, MAX_RETRY_DELAY};
use crate::conversation::Message;

use super::{CompletionClient, CompletionError};

/// How often and how patiently to repeat a failed completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    /// Pause before the first retry
    pub cooldown: Duration,
    /// Growth factor of the pause between retries
    pub backoff: f64,
}

impl RetryPolicy {
    /// Pause before retry number `attempt` (0-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.cooldown.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.cooldown.as_secs_f64() * self.backoff.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

impl From<&ClientSettings> for RetryPolicy {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            retries: settings.retries,
            cooldown: settings.cooldown(),
            backoff: settings.backoff,
        }
    }
}

/// Repeats retryable failures (network trouble, rate limits) of the wrapped
/// client. Everything else is returned on the first occurrence.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Err(err) if err.is_retryable() && attempt < self.policy.retries => {
                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Completion failed ({}), retry {}/{} in {:?}",
                        err,
                        attempt,
                        self.policy.retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
