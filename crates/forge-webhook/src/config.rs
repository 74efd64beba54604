//! Webhook engine configuration and per-request delivery targets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The consumer-supplied destination for one request's webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// Destination URL.
    pub url: String,
    /// Optional signing secret. An empty string disables signing, same as
    /// `None`.
    pub secret: Option<String>,
}

impl WebhookTarget {
    /// Create an unsigned target.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
        }
    }

    /// Create a signed target.
    #[must_use]
    pub fn with_secret(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: Some(secret.into()),
        }
    }

    /// The signing secret, if a non-empty one was supplied.
    #[must_use]
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Configuration for the webhook delivery engine.
#[derive(Debug, Clone)]
pub struct WebhookEngineConfig {
    /// Per-attempt HTTP timeout.
    pub webhook_timeout: Duration,
    /// Number of retries after the first attempt.
    pub max_retries: usize,
    /// Consecutive failures that open a URL's circuit.
    pub circuit_threshold: u32,
    /// How long an opened circuit stays open.
    pub circuit_timeout: Duration,
    /// Sleep before each attempt. The default table is the authoritative
    /// retry policy; tests may shrink it.
    pub retry_delays: Vec<Duration>,
    /// Deadline for detached `deliver_async` tasks.
    pub async_delivery_timeout: Duration,
}

impl Default for WebhookEngineConfig {
    fn default() -> Self {
        Self {
            webhook_timeout: Duration::from_secs(10),
            max_retries: 5,
            circuit_threshold: 5,
            circuit_timeout: Duration::from_secs(60),
            retry_delays: vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            async_delivery_timeout: Duration::from_secs(120),
        }
    }
}

impl WebhookEngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported variables: `FORGE_WEBHOOK_TIMEOUT_SECONDS`,
    /// `FORGE_WEBHOOK_MAX_RETRIES`, `FORGE_WEBHOOK_CIRCUIT_THRESHOLD`,
    /// `FORGE_WEBHOOK_CIRCUIT_TIMEOUT_SECONDS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FORGE_WEBHOOK_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.webhook_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("FORGE_WEBHOOK_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.max_retries = n;
            }
        }
        if let Ok(val) = std::env::var("FORGE_WEBHOOK_CIRCUIT_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.circuit_threshold = n;
            }
        }
        if let Ok(val) = std::env::var("FORGE_WEBHOOK_CIRCUIT_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.circuit_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Total attempts per `deliver` call: the first attempt plus up to
    /// `max_retries` retries, capped by the delay table.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.max_retries
            .saturating_add(1)
            .min(self.retry_delays.len().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_policy() {
        let config = WebhookEngineConfig::default();
        assert_eq!(config.webhook_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.circuit_threshold, 5);
        assert_eq!(config.circuit_timeout, Duration::from_secs(60));
        assert_eq!(config.retry_delays.len(), 5);
    }

    #[test]
    fn attempt_count_caps_at_delay_table() {
        let config = WebhookEngineConfig::default();
        assert_eq!(config.attempt_count(), 5);

        let one_shot = WebhookEngineConfig {
            max_retries: 0,
            ..WebhookEngineConfig::default()
        };
        assert_eq!(one_shot.attempt_count(), 1);

        let few = WebhookEngineConfig {
            max_retries: 2,
            ..WebhookEngineConfig::default()
        };
        assert_eq!(few.attempt_count(), 3);
    }

    #[test]
    fn empty_signing_secret_disables_signing() {
        assert!(WebhookTarget::new("https://c.test/h").signing_secret().is_none());
        assert!(WebhookTarget::with_secret("https://c.test/h", "")
            .signing_secret()
            .is_none());
        assert_eq!(
            WebhookTarget::with_secret("https://c.test/h", "k").signing_secret(),
            Some("k")
        );
    }
}
