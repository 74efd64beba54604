//! Processor configuration.

use std::time::Duration;

/// Configuration for the request processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How long `create_agent` waits for the new pod to become ready.
    pub ready_timeout: Duration,
    /// Budget for the optional graceful-shutdown RPC during delete.
    pub graceful_shutdown_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(120),
            graceful_shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported variables: `FORGE_POD_READY_TIMEOUT_SECONDS`,
    /// `FORGE_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FORGE_POD_READY_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.ready_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("FORGE_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.graceful_shutdown_timeout = Duration::from_secs(secs);
            }
        }

        config
    }
}
