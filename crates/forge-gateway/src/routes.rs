//! Router configuration.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use forge_agent_rpc::AgentConnector;
use forge_cluster::ClusterManager;
use forge_processor::Processor;

use crate::handlers::{agents, commands, health};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Health (public)
/// - `GET /healthz`, `GET /readyz`
///
/// ## Agents
/// - `POST /api/v1/agents` — create an agent (synchronous)
/// - `GET /api/v1/agents?user_id=` — list a user's agents
/// - `GET /api/v1/agents/{agent_id}?user_id=[&refresh=true]` — inspect
/// - `DELETE /api/v1/agents/{agent_id}?user_id=[&graceful=true]` — delete
///
/// ## Commands (asynchronous, `202 Accepted`)
/// - `POST /api/v1/agents/{agent_id}/messages?user_id=`
/// - `POST /api/v1/agents/{agent_id}/interrupt?user_id=`
pub fn create_router<P, M, A>(state: GatewayState<P, M, A>) -> Router
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(
            "/api/v1/agents",
            get(agents::list_agents::<P, M, A>).post(agents::create_agent::<P, M, A>),
        )
        .route(
            "/api/v1/agents/{agent_id}",
            get(agents::get_agent::<P, M, A>).delete(agents::delete_agent::<P, M, A>),
        )
        .route(
            "/api/v1/agents/{agent_id}/messages",
            post(commands::send_message::<P, M, A>),
        )
        .route(
            "/api/v1/agents/{agent_id}/interrupt",
            post(commands::interrupt::<P, M, A>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
