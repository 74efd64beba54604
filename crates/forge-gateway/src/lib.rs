//! HTTP command surface for the Forge platform.
//!
//! The gateway translates consumer HTTP calls into processor and cluster
//! operations. Synchronous endpoints (create/list/get/delete) propagate
//! errors to the HTTP response; asynchronous command endpoints answer
//! `202 Accepted` immediately and launch detached background processing —
//! errors after the 202 are reported through webhooks only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
