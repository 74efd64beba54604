//! Error types for the agent RPC client.

use thiserror::Error;

/// Errors that can occur when talking to an agent.
///
/// `Connect` and `Rpc` are deliberately distinct: the processor maps the
/// former to an unreachable-agent webhook and the latter to a send failure.
#[derive(Debug, Error)]
pub enum AgentRpcError {
    /// The agent endpoint could not be reached.
    #[error("failed to connect to agent at {url}: {reason}")]
    Connect {
        /// The base URL that was dialed.
        url: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The call failed after the connection was established.
    #[error("agent RPC failed: {0}")]
    Rpc(#[from] tonic::Status),
}

impl AgentRpcError {
    pub(crate) fn connect(url: &str, err: tonic::transport::Error) -> Self {
        Self::Connect {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// A specialized Result type for agent RPC operations.
pub type Result<T> = std::result::Result<T, AgentRpcError>;
