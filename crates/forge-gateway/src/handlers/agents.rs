//! Agent lifecycle endpoints: create, list, get, delete.
//!
//! These are synchronous pass-throughs; errors propagate to the HTTP
//! response.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forge_agent_rpc::proto::{AgentState, AgentStatus};
use forge_agent_rpc::AgentConnector;
use forge_cluster::{ClusterManager, PodPhase, PodSnapshot};
use forge_core::{AgentId, PodId, UserId};
use forge_processor::Processor;

use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters common to the per-agent endpoints.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// The owning user.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl UserQuery {
    pub(crate) fn require_user_id(&self) -> Result<UserId, ApiError> {
        let raw = self
            .user_id
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("user_id query parameter is required".into()))?;
        Ok(raw.parse()?)
    }
}

/// Query parameters for fetching one agent.
#[derive(Debug, Deserialize)]
pub struct GetAgentQuery {
    /// The owning user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// When true, probe the agent process for live status.
    #[serde(default)]
    pub refresh: bool,
}

/// Query parameters for deleting one agent.
#[derive(Debug, Deserialize)]
pub struct DeleteAgentQuery {
    /// The owning user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// When true, ask the agent to shut down before deleting the pod.
    #[serde(default)]
    pub graceful: bool,
}

/// Request body for creating an agent.
#[derive(Debug, Deserialize)]
pub struct CreateAgentBody {
    /// The user the agent will belong to.
    pub owner_id: String,
}

/// Observed pod attributes for one agent.
#[derive(Debug, Serialize)]
pub struct AgentResponse {
    /// The agent's identifier.
    pub agent_id: Option<String>,
    /// The owning user.
    pub user_id: Option<String>,
    /// The workload name.
    pub pod_name: String,
    /// Observed pod phase.
    pub phase: PodPhase,
    /// Whether the pod currently satisfies the readiness predicate.
    pub ready: bool,
    /// Pod IP, once assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    /// Node the pod runs on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Pod creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Live status from the agent process, when requested and reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatusResponse>,
}

impl From<PodSnapshot> for AgentResponse {
    fn from(pod: PodSnapshot) -> Self {
        let ready = pod.is_ready();
        Self {
            agent_id: pod.agent_id.map(|id| id.to_string()),
            user_id: pod.user_id.map(|id| id.to_string()),
            pod_name: pod.name,
            phase: pod.phase,
            ready,
            pod_ip: pod.pod_ip,
            node_name: pod.node_name,
            created_at: pod.created_at,
            status: None,
        }
    }
}

/// Live status reported by the agent process.
#[derive(Debug, Serialize)]
pub struct AgentStatusResponse {
    /// Current session identifier.
    pub session_id: String,
    /// `idle`, `processing`, `error`, or `unknown`.
    pub state: &'static str,
    /// Highest event ordinal emitted so far.
    pub latest_seq: u64,
    /// Model currently in use.
    pub current_model: String,
    /// Permission mode currently in use.
    pub permission_mode: String,
    /// Process uptime in milliseconds.
    pub uptime_ms: i64,
}

impl From<AgentStatus> for AgentStatusResponse {
    fn from(status: AgentStatus) -> Self {
        let state = match AgentState::try_from(status.state) {
            Ok(AgentState::Idle) => "idle",
            Ok(AgentState::Processing) => "processing",
            Ok(AgentState::Error) => "error",
            Err(_) => "unknown",
        };
        Self {
            session_id: status.session_id,
            state,
            latest_seq: status.latest_seq,
            current_model: status.current_model,
            permission_mode: status.permission_mode,
            uptime_ms: status.uptime_ms,
        }
    }
}

/// Response for the agent list.
#[derive(Debug, Serialize)]
pub struct ListAgentsResponse {
    /// Agents belonging to the user.
    pub agents: Vec<AgentResponse>,
    /// Number of agents returned.
    pub total: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a new agent and block until its pod is ready.
///
/// # Errors
///
/// Returns an error if provisioning fails or times out.
pub async fn create_agent<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Json(body): Json<CreateAgentBody>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id: UserId = body.owner_id.parse()?;

    let pod_id = state.processor.create_agent(&user_id).await?;
    let pod = state.cluster.get_pod(&pod_id).await?;

    Ok((StatusCode::CREATED, Json(AgentResponse::from(pod))))
}

/// List all agents belonging to a user.
///
/// # Errors
///
/// Returns an error if the cluster list call fails.
pub async fn list_agents<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id = query.require_user_id()?;
    let pods = state.cluster.list_pods_for_user(&user_id).await?;

    let agents: Vec<AgentResponse> = pods.into_iter().map(AgentResponse::from).collect();
    let total = agents.len();

    Ok(Json(ListAgentsResponse { agents, total }))
}

/// Fetch one agent's observed pod attributes.
///
/// With `refresh=true`, additionally probes the agent process for live
/// status; probe failures are swallowed.
///
/// # Errors
///
/// Returns `not_found` when the pod does not exist.
pub async fn get_agent<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Path(agent_id): Path<String>,
    Query(query): Query<GetAgentQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id = UserQuery {
        user_id: query.user_id.clone(),
    }
    .require_user_id()?;
    let agent_id: AgentId = agent_id.parse()?;
    let pod_id = PodId::new(user_id, agent_id);

    let pod = state.cluster.get_pod(&pod_id).await?;
    let mut response = AgentResponse::from(pod);

    if query.refresh {
        response.status = refresh_status(&state, &pod_id).await;
    }

    Ok(Json(response))
}

/// Best-effort live-status probe; any failure is logged and swallowed.
async fn refresh_status<P, M, A>(
    state: &GatewayState<P, M, A>,
    pod_id: &PodId,
) -> Option<AgentStatusResponse>
where
    P: Processor,
    M: ClusterManager,
    A: AgentConnector,
{
    let address = match state.cluster.pod_address(pod_id).await {
        Ok(address) => address,
        Err(err) => {
            tracing::debug!(pod = %pod_id, error = %err, "status refresh skipped");
            return None;
        }
    };

    match state.connector.get_status(&address).await {
        Ok(status) => Some(AgentStatusResponse::from(status)),
        Err(err) => {
            tracing::debug!(pod = %pod_id, error = %err, "status refresh failed");
            None
        }
    }
}

/// Delete an agent's pod, optionally shutting the agent down first.
///
/// # Errors
///
/// Returns an error only from the final pod delete.
pub async fn delete_agent<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Path(agent_id): Path<String>,
    Query(query): Query<DeleteAgentQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id = UserQuery {
        user_id: query.user_id.clone(),
    }
    .require_user_id()?;
    let agent_id: AgentId = agent_id.parse()?;

    state
        .processor
        .delete_agent(&user_id, &agent_id, query.graceful)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
