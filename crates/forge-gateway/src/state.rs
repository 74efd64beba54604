//! Gateway application state.

use std::sync::Arc;

use forge_agent_rpc::AgentConnector;
use forge_cluster::ClusterManager;
use forge_processor::Processor;

use crate::config::GatewayConfig;

/// Shared state available to all request handlers.
///
/// The gateway owns the processor; the cluster manager and connector are
/// the same instances the processor composes, held directly for the
/// synchronous pass-through endpoints.
pub struct GatewayState<P, M, A>
where
    P: Processor,
    M: ClusterManager,
    A: AgentConnector,
{
    /// The request processor for commands and lifecycle operations.
    pub processor: Arc<P>,
    /// The cluster manager for pod listing and inspection.
    pub cluster: Arc<M>,
    /// The agent connector for best-effort status refreshes.
    pub connector: Arc<A>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<P, M, A> GatewayState<P, M, A>
where
    P: Processor,
    M: ClusterManager,
    A: AgentConnector,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        processor: Arc<P>,
        cluster: Arc<M>,
        connector: Arc<A>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            processor,
            cluster,
            connector,
            config,
        }
    }
}

impl<P, M, A> Clone for GatewayState<P, M, A>
where
    P: Processor,
    M: ClusterManager,
    A: AgentConnector,
{
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            cluster: Arc::clone(&self.cluster),
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
        }
    }
}
