//! gRPC client for the agent streaming service.
//!
//! Clients are cheap and created per request; there is no pooling. The
//! transport is HTTP/2 cleartext with **no overall request deadline** —
//! streams stay open as long as the agent keeps them open, and dropping the
//! returned stream is the sole cancellation mechanism.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tonic_prost::ProstCodec;
use tracing::debug;

use crate::error::{AgentRpcError, Result};
use crate::proto::{
    AgentRequest, AgentResponse, AgentStatus, GetStatusRequest, ShutdownRequest, ShutdownResponse,
};

const CONNECT_PATH: &str = "/forge.agent.v1.AgentService/Connect";
const GET_STATUS_PATH: &str = "/forge.agent.v1.AgentService/GetStatus";
const SHUTDOWN_PATH: &str = "/forge.agent.v1.AgentService/Shutdown";

/// The stream of responses read back from one `Connect` call.
pub type AgentResponseStream = BoxStream<'static, std::result::Result<AgentResponse, Status>>;

/// Trait for opening RPCs against an agent at a resolved base URL.
///
/// This abstracts the client so the request processor can be exercised
/// against a scripted implementation in tests.
#[async_trait::async_trait]
pub trait AgentConnector: Send + Sync {
    /// Fetch the agent's status record.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unreachable or the call fails.
    async fn get_status(&self, base_url: &str) -> Result<AgentStatus>;

    /// Ask the agent process to shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unreachable or the call fails.
    async fn shutdown(&self, base_url: &str, graceful: bool) -> Result<()>;

    /// Open the bidirectional stream, send exactly one request, and
    /// half-close the outbound direction.
    ///
    /// The returned stream yields the agent's responses until the agent
    /// closes its side.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRpcError::Connect`] when the endpoint is unreachable
    /// and [`AgentRpcError::Rpc`] when the call fails after connecting.
    async fn open_stream(
        &self,
        base_url: &str,
        request: AgentRequest,
    ) -> Result<AgentResponseStream>;
}

/// tonic-based connector speaking h2c to agent pods.
#[derive(Debug, Clone)]
pub struct GrpcAgentConnector {
    connect_timeout: Duration,
}

impl Default for GrpcAgentConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl GrpcAgentConnector {
    /// Create a connector with the default connect timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector with a custom connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Establish a channel to the agent.
    ///
    /// Only the TCP connect is bounded; no per-request timeout is set
    /// because the `Connect` stream is open-ended.
    async fn channel(&self, base_url: &str) -> Result<Grpc<Channel>> {
        let endpoint = Endpoint::from_shared(base_url.to_string())
            .map_err(|e| AgentRpcError::connect(base_url, e))?
            .connect_timeout(self.connect_timeout);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| AgentRpcError::connect(base_url, e))?;

        Ok(Grpc::new(channel))
    }
}

#[async_trait::async_trait]
impl AgentConnector for GrpcAgentConnector {
    async fn get_status(&self, base_url: &str) -> Result<AgentStatus> {
        let mut grpc = self.channel(base_url).await?;
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;

        let codec: ProstCodec<GetStatusRequest, AgentStatus> = ProstCodec::default();
        let path = PathAndQuery::from_static(GET_STATUS_PATH);
        let response = grpc
            .unary(Request::new(GetStatusRequest {}), path, codec)
            .await?;

        Ok(response.into_inner())
    }

    async fn shutdown(&self, base_url: &str, graceful: bool) -> Result<()> {
        let mut grpc = self.channel(base_url).await?;
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;

        let codec: ProstCodec<ShutdownRequest, ShutdownResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static(SHUTDOWN_PATH);
        let response = grpc
            .unary(Request::new(ShutdownRequest { graceful }), path, codec)
            .await?;

        debug!(
            base_url,
            accepted = response.into_inner().success,
            "agent acknowledged shutdown"
        );
        Ok(())
    }

    async fn open_stream(
        &self,
        base_url: &str,
        request: AgentRequest,
    ) -> Result<AgentResponseStream> {
        let mut grpc = self.channel(base_url).await?;
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;

        // A one-item outbound stream: the single request goes out, then the
        // outbound direction half-closes.
        let outbound = futures::stream::iter(std::iter::once(request));

        let codec: ProstCodec<AgentRequest, AgentResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static(CONNECT_PATH);
        let response = grpc.streaming(Request::new(outbound), path, codec).await?;

        Ok(response.into_inner().boxed())
    }
}

/// A scripted connector for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::{
        AgentConnector, AgentRequest, AgentResponse, AgentResponseStream, AgentRpcError,
        AgentStatus, Result, Status, StreamExt,
    };

    /// Outcome scripted for the next `open_stream` call.
    enum StreamScript {
        /// Yield these items, then end the stream.
        Events(Vec<std::result::Result<AgentResponse, Status>>),
        /// Fail the open itself.
        Fail(MockFailure),
    }

    /// How a scripted call should fail.
    #[derive(Debug, Clone, Copy)]
    pub enum MockFailure {
        /// The endpoint is unreachable.
        Connect,
        /// The call failed after connecting.
        Rpc,
    }

    impl MockFailure {
        fn into_error(self, base_url: &str) -> AgentRpcError {
            match self {
                Self::Connect => AgentRpcError::Connect {
                    url: base_url.to_string(),
                    reason: "connection refused".to_string(),
                },
                Self::Rpc => AgentRpcError::Rpc(Status::unavailable("stream rejected")),
            }
        }
    }

    /// A mock connector returning scripted statuses and streams, recording
    /// every request it is asked to send.
    #[derive(Default)]
    pub struct MockAgentConnector {
        streams: Mutex<VecDeque<StreamScript>>,
        sent: Mutex<Vec<AgentRequest>>,
        status: Mutex<Option<AgentStatus>>,
        shutdown_calls: Mutex<Vec<bool>>,
        fail_shutdown: Mutex<bool>,
    }

    impl MockAgentConnector {
        /// Create an empty mock connector.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the next `open_stream` call to yield these items.
        pub fn push_stream(&self, items: Vec<std::result::Result<AgentResponse, Status>>) {
            self.streams.lock().push_back(StreamScript::Events(items));
        }

        /// Script the next `open_stream` call to fail.
        pub fn push_stream_failure(&self, failure: MockFailure) {
            self.streams.lock().push_back(StreamScript::Fail(failure));
        }

        /// Script the status returned by `get_status`.
        pub fn set_status(&self, status: AgentStatus) {
            *self.status.lock() = Some(status);
        }

        /// Make every `shutdown` call fail.
        pub fn fail_shutdown(&self) {
            *self.fail_shutdown.lock() = true;
        }

        /// Requests sent through `open_stream`, in order.
        #[must_use]
        pub fn sent_requests(&self) -> Vec<AgentRequest> {
            self.sent.lock().clone()
        }

        /// Gracefulness flags of every `shutdown` call, in order.
        #[must_use]
        pub fn shutdown_calls(&self) -> Vec<bool> {
            self.shutdown_calls.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl AgentConnector for MockAgentConnector {
        async fn get_status(&self, base_url: &str) -> Result<AgentStatus> {
            self.status
                .lock()
                .clone()
                .ok_or_else(|| MockFailure::Connect.into_error(base_url))
        }

        async fn shutdown(&self, base_url: &str, graceful: bool) -> Result<()> {
            self.shutdown_calls.lock().push(graceful);
            if *self.fail_shutdown.lock() {
                return Err(MockFailure::Rpc.into_error(base_url));
            }
            Ok(())
        }

        async fn open_stream(
            &self,
            base_url: &str,
            request: AgentRequest,
        ) -> Result<AgentResponseStream> {
            self.sent.lock().push(request);
            match self.streams.lock().pop_front() {
                Some(StreamScript::Events(items)) => {
                    Ok(futures::stream::iter(items).boxed())
                }
                Some(StreamScript::Fail(failure)) => Err(failure.into_error(base_url)),
                None => Ok(futures::stream::iter(Vec::new()).boxed()),
            }
        }
    }
}
