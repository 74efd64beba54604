//! Error types for the request processor.

use thiserror::Error;

/// Errors that can occur while processing a command.
///
/// Errors raised before the HTTP surface has answered `202 Accepted`
/// propagate to the caller; errors after that are reported through
/// webhooks only, and these values end up in logs.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Cluster operation failed.
    #[error(transparent)]
    Cluster(#[from] forge_cluster::ClusterError),

    /// Agent RPC failed.
    #[error(transparent)]
    Rpc(#[from] forge_agent_rpc::AgentRpcError),

    /// The agent's response stream failed mid-flight.
    #[error("agent stream error: {0}")]
    Stream(String),

    /// The pod did not become ready within the configured window.
    #[error("pod {0} did not become ready in time")]
    ReadyTimeout(String),
}

/// A specialized Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;
