//! The webhook payload envelope and its translation from agent responses.
//!
//! This is the only surface touched if the agent wire format evolves.

use chrono::{DateTime, Utc};
use forge_agent_rpc::proto::{agent_response, AgentResponse, AgentState};
use forge_core::{AgentId, RequestId};
use serde::{Deserialize, Serialize};

/// Envelope `event_type` for forwarded agent events.
pub const EVENT_TYPE_EVENT: &str = "agent.event";

/// Envelope `event_type` for agent errors.
pub const EVENT_TYPE_ERROR: &str = "agent.error";

/// Envelope `event_type` for completion markers.
pub const EVENT_TYPE_COMPLETE: &str = "agent.complete";

/// Agent event categories that terminate a request.
const COMPLETION_EVENT_TYPES: [&str; 3] =
    ["session.completed", "session.error", "message.completed"];

/// Error details carried by `agent.error` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// False when the request cannot continue.
    pub recoverable: bool,
}

/// The JSON envelope POSTed to the consumer's webhook for every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// `agent.event`, `agent.error`, or `agent.complete`.
    pub event_type: String,
    /// The agent the event came from.
    pub agent_id: String,
    /// The request the event belongs to.
    pub request_id: String,
    /// The agent's session identifier.
    pub session_id: String,
    /// Monotonic event ordinal within the request.
    pub seq: u64,
    /// Event time, ISO-8601 UTC.
    pub timestamp: DateTime<Utc>,
    /// `idle`, `processing`, `error`, or `unknown`.
    pub agent_state: String,
    /// Marks the request's terminal event. Omitted when false.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
    /// The upstream event category; a convenience filter for consumers.
    /// Present on `agent.event` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opencode_event_type: Option<String>,
    /// The raw event JSON, forwarded without interpretation. Present on
    /// `agent.event` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
    /// Error details. Present on `agent.error` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Whether the request succeeded. Present on `agent.complete` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl WebhookPayload {
    /// Translate one agent response into its webhook payload.
    #[must_use]
    pub fn from_response(agent_id: &AgentId, response: &AgentResponse) -> Self {
        let mut payload = Self {
            event_type: EVENT_TYPE_EVENT.to_string(),
            agent_id: agent_id.to_string(),
            request_id: response.request_id.clone(),
            session_id: response.session_id.clone(),
            seq: response.seq,
            timestamp: DateTime::from_timestamp_millis(response.timestamp)
                .unwrap_or_else(Utc::now),
            agent_state: state_label(response.state).to_string(),
            is_final: false,
            opencode_event_type: None,
            event: None,
            error: None,
            success: None,
        };

        match &response.payload {
            Some(agent_response::Payload::Event(event)) => {
                payload.is_final = COMPLETION_EVENT_TYPES.contains(&event.event_type.as_str());
                payload.opencode_event_type = Some(event.event_type.clone());
                payload.event = Some(opaque_json(&event.event_json));
            }
            Some(agent_response::Payload::Error(error)) => {
                payload.event_type = EVENT_TYPE_ERROR.to_string();
                payload.is_final = true;
                payload.error = Some(ErrorInfo {
                    code: error.code.clone(),
                    message: error.message.clone(),
                    recoverable: !error.fatal,
                });
            }
            Some(agent_response::Payload::Complete(complete)) => {
                payload.event_type = EVENT_TYPE_COMPLETE.to_string();
                payload.is_final = true;
                payload.success = Some(complete.success);
            }
            None => {}
        }

        payload
    }

    /// Synthesize the payload for an agent that could not be reached.
    #[must_use]
    pub fn agent_unreachable(agent_id: &AgentId, request_id: &RequestId, message: &str) -> Self {
        Self::synthetic_error(agent_id, request_id, "AGENT_UNREACHABLE", message)
    }

    /// Synthesize the payload for a request that could not be sent.
    #[must_use]
    pub fn send_failed(agent_id: &AgentId, request_id: &RequestId, message: &str) -> Self {
        Self::synthetic_error(agent_id, request_id, "SEND_FAILED", message)
    }

    /// Synthesize the payload for a stream that failed mid-flight.
    #[must_use]
    pub fn stream_error(agent_id: &AgentId, request_id: &RequestId, message: &str) -> Self {
        Self::synthetic_error(agent_id, request_id, "STREAM_ERROR", message)
    }

    fn synthetic_error(
        agent_id: &AgentId,
        request_id: &RequestId,
        code: &str,
        message: &str,
    ) -> Self {
        Self {
            event_type: EVENT_TYPE_ERROR.to_string(),
            agent_id: agent_id.to_string(),
            request_id: request_id.to_string(),
            session_id: String::new(),
            seq: 0,
            timestamp: Utc::now(),
            agent_state: "unknown".to_string(),
            is_final: true,
            opencode_event_type: None,
            event: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
                recoverable: false,
            }),
            success: None,
        }
    }
}

fn state_label(state: i32) -> &'static str {
    match AgentState::try_from(state) {
        Ok(AgentState::Idle) => "idle",
        Ok(AgentState::Processing) => "processing",
        Ok(AgentState::Error) => "error",
        Err(_) => "unknown",
    }
}

/// Parse the agent's opaque JSON. Bytes that are not valid JSON are
/// forwarded as a lossy string rather than dropped.
fn opaque_json(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
