//! Asynchronous command endpoints: send-message and interrupt.
//!
//! Both validate, answer `202 Accepted`, and launch detached background
//! processing. The spawned task owns everything it needs — nothing is tied
//! to the request's lifetime, which ends the moment the 202 goes out.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use forge_agent_rpc::AgentConnector;
use forge_cluster::ClusterManager;
use forge_core::{AgentId, RequestId, UserId};
use forge_processor::Processor;
use forge_webhook::WebhookTarget;

use crate::error::ApiError;
use crate::handlers::agents::UserQuery;
use crate::state::GatewayState;

/// Request body for `POST /api/v1/agents/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    /// The message to deliver to the agent.
    #[serde(default)]
    pub content: Option<String>,
    /// Where the agent's events should be POSTed.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Optional signing secret for the webhook.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Caller-supplied request identifier; generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Request body for `POST /api/v1/agents/{id}/interrupt`.
#[derive(Debug, Deserialize)]
pub struct InterruptBody {
    /// Where the agent's events should be POSTed.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Optional signing secret for the webhook.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Caller-supplied request identifier; generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// `202 Accepted` response for both commands.
#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    /// The request identifier events will carry.
    pub request_id: String,
    /// The target agent.
    pub agent_id: String,
    /// `processing` or `interrupting`.
    pub status: &'static str,
}

fn parse_request_id(supplied: Option<&str>) -> Result<RequestId, ApiError> {
    match supplied {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("request_id must not be empty".into())),
        None => Ok(RequestId::generate()),
    }
}

fn require_webhook_url(url: Option<&str>) -> Result<String, ApiError> {
    match url {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(ApiError::BadRequest("webhook_url is required".into())),
    }
}

/// Accept a send-message command.
///
/// # Errors
///
/// Returns `bad_request` when `content`, `webhook_url`, or `user_id` is
/// missing. Everything after validation is reported via webhook only.
pub async fn send_message<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Path(agent_id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(body): Json<SendMessageBody>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id: UserId = query.require_user_id()?;
    let agent_id: AgentId = agent_id.parse()?;

    let content = match body.content {
        Some(content) if !content.is_empty() => content,
        _ => return Err(ApiError::BadRequest("content is required".into())),
    };
    let webhook_url = require_webhook_url(body.webhook_url.as_deref())?;
    let request_id = parse_request_id(body.request_id.as_deref())?;

    let target = WebhookTarget {
        url: webhook_url,
        secret: body.webhook_secret,
    };

    let accepted = CommandAccepted {
        request_id: request_id.to_string(),
        agent_id: agent_id.to_string(),
        status: "processing",
    };

    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        if let Err(err) = processor
            .send_message(&user_id, &agent_id, &request_id, content, target)
            .await
        {
            error!(
                request_id = %request_id,
                agent = %agent_id,
                error = %err,
                "send-message processing failed"
            );
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Accept an interrupt command.
///
/// # Errors
///
/// Returns `bad_request` when `webhook_url` or `user_id` is missing.
pub async fn interrupt<P, M, A>(
    State(state): State<Arc<GatewayState<P, M, A>>>,
    Path(agent_id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(body): Json<InterruptBody>,
) -> Result<impl IntoResponse, ApiError>
where
    P: Processor + 'static,
    M: ClusterManager + 'static,
    A: AgentConnector + 'static,
{
    let user_id: UserId = query.require_user_id()?;
    let agent_id: AgentId = agent_id.parse()?;

    let webhook_url = require_webhook_url(body.webhook_url.as_deref())?;
    let request_id = parse_request_id(body.request_id.as_deref())?;

    let target = WebhookTarget {
        url: webhook_url,
        secret: body.webhook_secret,
    };

    let accepted = CommandAccepted {
        request_id: request_id.to_string(),
        agent_id: agent_id.to_string(),
        status: "interrupting",
    };

    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        if let Err(err) = processor
            .interrupt(&user_id, &agent_id, &request_id, target)
            .await
        {
            error!(
                request_id = %request_id,
                agent = %agent_id,
                error = %err,
                "interrupt processing failed"
            );
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
