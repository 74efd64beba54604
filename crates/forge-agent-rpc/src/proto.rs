//! Wire types for the agent streaming service.
//!
//! Maintained by hand against `proto/agent.proto`; the crate performs no
//! build-time code generation.

/// A single command sent to an agent over the `Connect` stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentRequest {
    /// Caller-visible identifier correlating the command with its events.
    #[prost(string, tag = "1")]
    pub request_id: ::prost::alloc::string::String,
    /// The command itself.
    #[prost(oneof = "agent_request::Command", tags = "2, 3, 4, 5")]
    pub command: ::core::option::Option<agent_request::Command>,
}

/// Nested types for [`AgentRequest`].
pub mod agent_request {
    /// The command carried by one request.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Command {
        /// Deliver a user message to the agent.
        #[prost(message, tag = "2")]
        SendMessage(super::SendMessage),
        /// Interrupt whatever the agent is doing.
        #[prost(message, tag = "3")]
        Interrupt(super::Interrupt),
        /// Switch the agent's model.
        #[prost(message, tag = "4")]
        SetModel(super::SetModel),
        /// Switch the agent's permission mode.
        #[prost(message, tag = "5")]
        SetPermissionMode(super::SetPermissionMode),
    }
}

/// Payload of a send-message command.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendMessage {
    /// The message content, forwarded verbatim to the agent.
    #[prost(string, tag = "1")]
    pub content: ::prost::alloc::string::String,
}

/// Payload of an interrupt command.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Interrupt {}

/// Payload of a set-model command.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetModel {
    /// Model identifier.
    #[prost(string, tag = "1")]
    pub model: ::prost::alloc::string::String,
}

/// Payload of a set-permission-mode command.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetPermissionMode {
    /// Permission mode name.
    #[prost(string, tag = "1")]
    pub mode: ::prost::alloc::string::String,
}

/// One item on an agent's response stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentResponse {
    /// The request this response belongs to.
    #[prost(string, tag = "1")]
    pub request_id: ::prost::alloc::string::String,
    /// The agent's session identifier.
    #[prost(string, tag = "2")]
    pub session_id: ::prost::alloc::string::String,
    /// Monotonic event ordinal within the request.
    #[prost(uint64, tag = "3")]
    pub seq: u64,
    /// Unix milliseconds.
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    /// Agent state at the time of the event.
    #[prost(enumeration = "AgentState", tag = "5")]
    pub state: i32,
    /// The event payload.
    #[prost(oneof = "agent_response::Payload", tags = "6, 7, 8")]
    pub payload: ::core::option::Option<agent_response::Payload>,
}

/// Nested types for [`AgentResponse`].
pub mod agent_response {
    /// The payload carried by one response.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// An opaque agent event.
        #[prost(message, tag = "6")]
        Event(super::Event),
        /// An error raised by the agent.
        #[prost(message, tag = "7")]
        Error(super::Error),
        /// Terminal completion marker.
        #[prost(message, tag = "8")]
        Complete(super::Complete),
    }
}

/// An opaque agent event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    /// Event category, used for completion detection and consumer filters.
    #[prost(string, tag = "1")]
    pub event_type: ::prost::alloc::string::String,
    /// Raw JSON, never parsed by the platform.
    #[prost(bytes = "vec", tag = "2")]
    pub event_json: ::prost::alloc::vec::Vec<u8>,
}

/// An error raised by the agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    /// Machine-readable error code.
    #[prost(string, tag = "1")]
    pub code: ::prost::alloc::string::String,
    /// Human-readable description.
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    /// True when the agent cannot recover.
    #[prost(bool, tag = "3")]
    pub fatal: bool,
}

/// Terminal completion marker.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Complete {
    /// Whether the request succeeded.
    #[prost(bool, tag = "1")]
    pub success: bool,
}

/// Agent execution state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AgentState {
    /// Waiting for work.
    Idle = 0,
    /// Processing a request.
    Processing = 1,
    /// In an error state.
    Error = 2,
}

/// Request for [`AgentStatus`].
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetStatusRequest {}

/// A small status record describing the agent process.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentStatus {
    /// The agent's identifier.
    #[prost(string, tag = "1")]
    pub agent_id: ::prost::alloc::string::String,
    /// Current session identifier.
    #[prost(string, tag = "2")]
    pub session_id: ::prost::alloc::string::String,
    /// Current execution state.
    #[prost(enumeration = "AgentState", tag = "3")]
    pub state: i32,
    /// Highest event ordinal emitted so far.
    #[prost(uint64, tag = "4")]
    pub latest_seq: u64,
    /// Model currently in use.
    #[prost(string, tag = "5")]
    pub current_model: ::prost::alloc::string::String,
    /// Permission mode currently in use.
    #[prost(string, tag = "6")]
    pub permission_mode: ::prost::alloc::string::String,
    /// Process uptime in milliseconds.
    #[prost(int64, tag = "7")]
    pub uptime_ms: i64,
}

/// Request to shut the agent process down.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ShutdownRequest {
    /// Allow the agent to finish in-flight work first.
    #[prost(bool, tag = "1")]
    pub graceful: bool,
}

/// Acknowledgement of a shutdown request.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ShutdownResponse {
    /// Whether the shutdown was accepted.
    #[prost(bool, tag = "1")]
    pub success: bool,
}

impl AgentResponse {
    /// The response's state as the typed enum, defaulting to `Idle` for
    /// values from a newer wire revision.
    #[must_use]
    pub fn agent_state(&self) -> AgentState {
        AgentState::try_from(self.state).unwrap_or(AgentState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn request_roundtrip_preserves_command() {
        let request = AgentRequest {
            request_id: "req_0011223344556677".to_string(),
            command: Some(agent_request::Command::SendMessage(SendMessage {
                content: "hello".to_string(),
            })),
        };

        let bytes = request.encode_to_vec();
        let decoded = AgentRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_roundtrip_preserves_payload_and_state() {
        let response = AgentResponse {
            request_id: "req_1".to_string(),
            session_id: "sess_1".to_string(),
            seq: 7,
            timestamp: 1_700_000_000_000,
            state: AgentState::Processing as i32,
            payload: Some(agent_response::Payload::Event(Event {
                event_type: "message.part.updated".to_string(),
                event_json: br#"{"delta":"hi"}"#.to_vec(),
            })),
        };

        let bytes = response.encode_to_vec();
        let decoded = AgentResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.agent_state(), AgentState::Processing);
    }

    #[test]
    fn unknown_state_falls_back_to_idle() {
        let response = AgentResponse {
            state: 42,
            ..Default::default()
        };
        assert_eq!(response.agent_state(), AgentState::Idle);
    }
}
