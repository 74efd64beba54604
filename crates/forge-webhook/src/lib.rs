//! Signed webhook delivery for Forge agent events.
//!
//! The [`WebhookEngine`] takes translated agent events and synchronously
//! delivers each to the consumer's URL with HMAC-SHA256 signing, a bounded
//! retry schedule, and a per-URL circuit breaker. Delivery state is
//! persisted through the delivery store after every attempt.
//!
//! The engine is deliberately synchronous per event: the response pump
//! calls [`WebhookEngine::deliver`] for event *i* before reading event
//! *i + 1*, which is what gives consumers in-order webhooks and applies
//! natural backpressure to the agent stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod circuit;
pub mod config;
pub mod engine;
pub mod error;
pub mod payload;
pub mod signature;

pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{WebhookEngineConfig, WebhookTarget};
pub use engine::WebhookEngine;
pub use error::{Result, WebhookError};
pub use payload::{ErrorInfo, WebhookPayload};
