//! Error types for webhook delivery.

use thiserror::Error;

/// Errors that can occur while delivering a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The URL's circuit is open; no HTTP call was attempted.
    #[error("circuit open for {0}")]
    CircuitOpen(String),

    /// The payload could not be serialized.
    #[error("failed to serialize webhook payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request never produced an HTTP response.
    #[error("webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The consumer answered with a 4xx. Not retried: a client error is
    /// the product's problem, not a transient fault.
    #[error("consumer rejected webhook with status {status}")]
    ClientError {
        /// The HTTP status code.
        status: u16,
        /// The first KiB of the response body.
        body: String,
    },

    /// A non-2xx, non-4xx outcome.
    #[error("webhook delivery failed with status {status}")]
    Failed {
        /// The HTTP status code.
        status: u16,
        /// The first KiB of the response body.
        body: String,
    },

    /// Every attempt in the schedule failed.
    #[error("webhook delivery to {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// The destination URL.
        url: String,
        /// Number of attempts made.
        attempts: usize,
        /// The last attempt's error.
        #[source]
        source: Box<WebhookError>,
    },

    /// The engine itself could not be constructed.
    #[error("webhook engine configuration error: {0}")]
    Config(String),
}

impl WebhookError {
    /// Whether this outcome must not be retried.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::ClientError { .. })
    }
}

/// A specialized Result type for webhook operations.
pub type Result<T> = std::result::Result<T, WebhookError>;
