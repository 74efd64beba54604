//! Types for the cluster manager.

use chrono::{DateTime, Utc};
use forge_core::{AgentId, UserId};
use serde::{Deserialize, Serialize};

/// Phase of the pod lifecycle as observed from the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    /// Pod has been accepted but containers are not yet running.
    Pending,
    /// Pod is running with at least one container.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Pod status cannot be determined.
    #[default]
    Unknown,
}

impl PodPhase {
    /// Parse a pod phase from a Kubernetes phase string.
    #[must_use]
    pub fn from_k8s_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Check if the pod is in a terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A point-in-time snapshot of one agent pod.
///
/// Readiness is observed, never written: see [`PodSnapshot::is_ready`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSnapshot {
    /// Kubernetes pod name (`"{user_id}-{agent_id}"`).
    pub name: String,
    /// Owner extracted from the `user-id` label.
    pub user_id: Option<UserId>,
    /// Agent extracted from the `agent-id` label.
    pub agent_id: Option<AgentId>,
    /// Current lifecycle phase.
    pub phase: PodPhase,
    /// Pod IP, once assigned by the cluster.
    pub pod_ip: Option<String>,
    /// Whether the pod reports any container statuses yet.
    pub has_container_statuses: bool,
    /// True when every reported container is ready. Vacuously true while
    /// no container statuses are present.
    pub containers_ready: bool,
    /// Node the pod is scheduled on.
    pub node_name: Option<String>,
    /// Creation timestamp from the cluster.
    pub created_at: Option<DateTime<Utc>>,
}

impl PodSnapshot {
    /// The readiness predicate.
    ///
    /// A pod is ready iff it is `Running`, has an IP, and every container
    /// reports ready. A running pod with an IP but no container statuses
    /// yet is also treated as ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == PodPhase::Running && self.pod_ip.is_some() && self.containers_ready
    }
}

/// One event observed on a pod's watch stream.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The pod appeared.
    Added(PodSnapshot),
    /// The pod changed.
    Modified(PodSnapshot),
    /// The pod was removed. Always terminal for a wait in progress.
    Deleted(PodSnapshot),
    /// The watch itself failed.
    Error(String),
}

/// Configuration for the cluster manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Kubernetes namespace for agent pods.
    pub namespace: String,
    /// Container image for the agent runtime.
    pub image: String,
    /// Container port the agent's gRPC server listens on.
    pub agent_port: u16,
    /// Path to a kubeconfig file. `None` uses the default client chain
    /// (in-cluster config or `$KUBECONFIG`).
    pub kubeconfig_path: Option<String>,
    /// When set, replaces the pod IP in resolved addresses. Useful for
    /// clusters whose pod network is not routable from the platform.
    pub node_host: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image: "ghcr.io/forge/forge-agent:latest".to_string(),
            agent_port: 50051,
            kubeconfig_path: None,
            node_host: None,
        }
    }
}

impl ClusterConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported variables: `FORGE_AGENT_NAMESPACE`, `FORGE_AGENT_IMAGE`,
    /// `FORGE_AGENT_PORT`, `FORGE_KUBECONFIG_PATH`, `FORGE_NODE_HOST`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FORGE_AGENT_NAMESPACE") {
            config.namespace = val;
        }
        if let Ok(val) = std::env::var("FORGE_AGENT_IMAGE") {
            config.image = val;
        }
        if let Ok(val) = std::env::var("FORGE_AGENT_PORT") {
            if let Ok(port) = val.parse() {
                config.agent_port = port;
            }
        }
        if let Ok(val) = std::env::var("FORGE_KUBECONFIG_PATH") {
            config.kubeconfig_path = Some(val);
        }
        if let Ok(val) = std::env::var("FORGE_NODE_HOST") {
            config.node_host = Some(val);
        }

        config
    }
}
