//! gRPC client for the Forge agent streaming service.
//!
//! Agent pods expose one streaming method, `Connect`, plus unary
//! `GetStatus` and `Shutdown` calls. This crate carries the hand-maintained
//! wire types (see `proto/agent.proto`) and the [`AgentConnector`] seam the
//! request processor drives them through.
//!
//! The platform writes exactly one [`proto::AgentRequest`] per stream and
//! half-closes; everything after that is reading the agent's responses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod proto;

pub use client::{AgentConnector, AgentResponseStream, GrpcAgentConnector};
pub use error::{AgentRpcError, Result};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock::{MockAgentConnector, MockFailure};
