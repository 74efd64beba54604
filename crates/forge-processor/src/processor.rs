//! The `Processor` trait and its implementation.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use forge_agent_rpc::proto::{agent_request, AgentRequest, Interrupt, SendMessage};
use forge_agent_rpc::{AgentConnector, AgentResponseStream, AgentRpcError};
use forge_cluster::ClusterManager;
use forge_core::{AgentId, PodId, RequestId, UserId};
use forge_store::DeliveryStore;
use forge_webhook::{WebhookEngine, WebhookPayload, WebhookTarget};

use crate::types::ProcessorConfig;
use crate::{ProcessorError, Result};

/// The four operations the HTTP surface drives.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    /// Provision a pod for a fresh agent and block until it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails or readiness is not reached in
    /// time; the half-created pod is deleted best-effort in the
    /// background.
    async fn create_agent(&self, user_id: &UserId) -> Result<PodId>;

    /// Delete an agent's pod, optionally asking the agent to shut down
    /// first.
    ///
    /// The graceful shutdown RPC runs under a bounded budget and its
    /// failure is swallowed; only the final pod delete can fail this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod delete fails.
    async fn delete_agent(&self, user_id: &UserId, agent_id: &AgentId, graceful: bool)
        -> Result<()>;

    /// Send a message to an agent and pump its events to the webhook.
    ///
    /// Runs for the lifetime of the agent's response stream; callers spawn
    /// it on a background task after answering `202 Accepted`.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unreachable or the stream fails;
    /// by then the error has already been reported through the webhook.
    async fn send_message(
        &self,
        user_id: &UserId,
        agent_id: &AgentId,
        request_id: &RequestId,
        content: String,
        target: WebhookTarget,
    ) -> Result<()>;

    /// Interrupt an agent and pump its events to the webhook.
    ///
    /// # Errors
    ///
    /// Same contract as [`Processor::send_message`].
    async fn interrupt(
        &self,
        user_id: &UserId,
        agent_id: &AgentId,
        request_id: &RequestId,
        target: WebhookTarget,
    ) -> Result<()>;
}

/// The production processor, generic over its collaborator seams.
pub struct RequestProcessor<C, A, S> {
    cluster: Arc<C>,
    connector: Arc<A>,
    webhooks: Arc<WebhookEngine<S>>,
    store: Arc<S>,
    config: ProcessorConfig,
}

impl<C, A, S> RequestProcessor<C, A, S>
where
    C: ClusterManager + 'static,
    A: AgentConnector,
    S: DeliveryStore + 'static,
{
    /// Create a processor from its collaborators.
    #[must_use]
    pub fn new(
        cluster: Arc<C>,
        connector: Arc<A>,
        webhooks: Arc<WebhookEngine<S>>,
        store: Arc<S>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            cluster,
            connector,
            webhooks,
            store,
            config,
        }
    }

    /// Best-effort deletion of a pod whose provisioning failed. Runs on a
    /// detached task so it survives cancellation of the caller.
    fn cleanup_failed_create(&self, pod_id: PodId) {
        let cluster = Arc::clone(&self.cluster);
        tokio::spawn(async move {
            if let Err(err) = cluster.delete_pod(&pod_id).await {
                warn!(pod = %pod_id, error = %err, "failed to clean up pod after create failure");
            }
        });
    }

    /// Shared machinery behind send-message and interrupt.
    async fn run_command(
        &self,
        pod_id: &PodId,
        request_id: &RequestId,
        command: agent_request::Command,
        target: WebhookTarget,
    ) -> Result<()> {
        let agent_id = &pod_id.agent_id;

        // Record-insert failure is logged but does not abort the command.
        if let Err(err) = self
            .store
            .create_record(request_id, agent_id, &target.url, target.secret.as_deref())
            .await
        {
            warn!(
                request_id = %request_id,
                agent = %agent_id,
                error = %err,
                "failed to create delivery record"
            );
        }

        let address = match self.cluster.pod_address(pod_id).await {
            Ok(address) => address,
            Err(err) => {
                self.fail_before_stream(
                    request_id,
                    &target,
                    WebhookPayload::agent_unreachable(agent_id, request_id, &err.to_string()),
                )
                .await;
                return Err(err.into());
            }
        };

        let request = AgentRequest {
            request_id: request_id.to_string(),
            command: Some(command),
        };

        let stream = match self.connector.open_stream(&address, request).await {
            Ok(stream) => stream,
            Err(err) => {
                let payload = match &err {
                    AgentRpcError::Connect { .. } => {
                        WebhookPayload::agent_unreachable(agent_id, request_id, &err.to_string())
                    }
                    AgentRpcError::Rpc(_) => {
                        WebhookPayload::send_failed(agent_id, request_id, &err.to_string())
                    }
                };
                self.fail_before_stream(request_id, &target, payload).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.store.mark_delivering(request_id).await {
            warn!(request_id = %request_id, error = %err, "failed to mark record delivering");
        }

        self.pump_responses(agent_id, request_id, &target, stream)
            .await
    }

    /// Report a failure that happened before any response was read: the
    /// error payload goes out asynchronously and the record goes terminal.
    async fn fail_before_stream(
        &self,
        request_id: &RequestId,
        target: &WebhookTarget,
        payload: WebhookPayload,
    ) {
        self.webhooks.deliver_async(target.clone(), payload);
        if let Err(err) = self.store.mark_failed(request_id).await {
            warn!(request_id = %request_id, error = %err, "failed to mark record failed");
        }
    }

    /// Loop over the agent's responses, forwarding each to the webhook.
    ///
    /// Deliveries are serial and in-order: event `i` is delivered before
    /// event `i + 1` is read. A slow consumer therefore backpressures the
    /// agent stream at the transport layer, by design.
    async fn pump_responses(
        &self,
        agent_id: &AgentId,
        request_id: &RequestId,
        target: &WebhookTarget,
        mut stream: AgentResponseStream,
    ) -> Result<()> {
        loop {
            match stream.next().await {
                Some(Ok(response)) => {
                    let payload = WebhookPayload::from_response(agent_id, &response);

                    let event_type = payload
                        .opencode_event_type
                        .clone()
                        .unwrap_or_else(|| payload.event_type.clone());
                    if let Err(err) = self
                        .store
                        .update_seq(request_id, payload.seq, &event_type)
                        .await
                    {
                        warn!(request_id = %request_id, error = %err, "failed to update seq");
                    }

                    // Delivery failures do not terminate the pump; later
                    // events still get their chance.
                    if let Err(err) = self.webhooks.deliver(target, &payload).await {
                        warn!(
                            request_id = %request_id,
                            seq = payload.seq,
                            error = %err,
                            "webhook delivery failed"
                        );
                    }

                    if payload.is_final {
                        self.complete(request_id).await;
                        return Ok(());
                    }
                }
                Some(Err(status)) => {
                    let payload =
                        WebhookPayload::stream_error(agent_id, request_id, &status.to_string());
                    if let Err(err) = self.webhooks.deliver(target, &payload).await {
                        warn!(
                            request_id = %request_id,
                            error = %err,
                            "failed to deliver stream-error webhook"
                        );
                    }
                    if let Err(err) = self.store.mark_failed(request_id).await {
                        warn!(request_id = %request_id, error = %err, "failed to mark record failed");
                    }
                    return Err(ProcessorError::Stream(status.to_string()));
                }
                None => {
                    // Clean end of stream without a final payload.
                    self.complete(request_id).await;
                    return Ok(());
                }
            }
        }
    }

    async fn complete(&self, request_id: &RequestId) {
        if let Err(err) = self.store.mark_completed(request_id).await {
            warn!(request_id = %request_id, error = %err, "failed to mark record completed");
        }
        debug!(request_id = %request_id, "request completed");
    }
}

#[async_trait::async_trait]
impl<C, A, S> Processor for RequestProcessor<C, A, S>
where
    C: ClusterManager + 'static,
    A: AgentConnector,
    S: DeliveryStore + 'static,
{
    async fn create_agent(&self, user_id: &UserId) -> Result<PodId> {
        let agent_id = AgentId::generate();
        let pod_id = PodId::new(user_id.clone(), agent_id);

        self.cluster.create_pod(&pod_id).await?;

        let ready = tokio::time::timeout(
            self.config.ready_timeout,
            self.cluster.wait_for_pod_ready(&pod_id),
        )
        .await;

        match ready {
            Ok(Ok(_)) => {
                info!(pod = %pod_id, user = %user_id, "agent provisioned");
                Ok(pod_id)
            }
            Ok(Err(err)) => {
                self.cleanup_failed_create(pod_id);
                Err(err.into())
            }
            Err(_) => {
                let name = pod_id.name();
                self.cleanup_failed_create(pod_id);
                Err(ProcessorError::ReadyTimeout(name))
            }
        }
    }

    async fn delete_agent(
        &self,
        user_id: &UserId,
        agent_id: &AgentId,
        graceful: bool,
    ) -> Result<()> {
        let pod_id = PodId::new(user_id.clone(), agent_id.clone());

        if graceful {
            let shutdown = tokio::time::timeout(self.config.graceful_shutdown_timeout, async {
                let address = self.cluster.pod_address(&pod_id).await?;
                self.connector.shutdown(&address, true).await?;
                Ok::<(), ProcessorError>(())
            })
            .await;

            // Graceful shutdown is opportunistic; any failure falls through
            // to the unconditional pod delete.
            match shutdown {
                Ok(Ok(())) => debug!(pod = %pod_id, "agent shut down gracefully"),
                Ok(Err(err)) => debug!(pod = %pod_id, error = %err, "graceful shutdown failed"),
                Err(_) => debug!(pod = %pod_id, "graceful shutdown timed out"),
            }
        }

        self.cluster.delete_pod(&pod_id).await?;
        info!(pod = %pod_id, graceful, "agent deleted");
        Ok(())
    }

    async fn send_message(
        &self,
        user_id: &UserId,
        agent_id: &AgentId,
        request_id: &RequestId,
        content: String,
        target: WebhookTarget,
    ) -> Result<()> {
        let pod_id = PodId::new(user_id.clone(), agent_id.clone());
        self.run_command(
            &pod_id,
            request_id,
            agent_request::Command::SendMessage(SendMessage { content }),
            target,
        )
        .await
    }

    async fn interrupt(
        &self,
        user_id: &UserId,
        agent_id: &AgentId,
        request_id: &RequestId,
        target: WebhookTarget,
    ) -> Result<()> {
        let pod_id = PodId::new(user_id.clone(), agent_id.clone());
        self.run_command(
            &pod_id,
            request_id,
            agent_request::Command::Interrupt(Interrupt {}),
            target,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forge_agent_rpc::proto::{agent_response, AgentResponse, AgentState, Complete, Event};
    use forge_agent_rpc::MockAgentConnector;
    use forge_cluster::{ClusterError, MockClusterManager};
    use forge_store::{DeliveryStatus, MemoryDeliveryStore};
    use forge_webhook::WebhookEngineConfig;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct Harness {
        cluster: Arc<MockClusterManager>,
        connector: Arc<MockAgentConnector>,
        store: Arc<MemoryDeliveryStore>,
        processor: RequestProcessor<MockClusterManager, MockAgentConnector, MemoryDeliveryStore>,
    }

    fn harness(config: ProcessorConfig) -> Harness {
        let cluster = Arc::new(MockClusterManager::new());
        let connector = Arc::new(MockAgentConnector::new());
        let store = Arc::new(MemoryDeliveryStore::new());
        let engine_config = WebhookEngineConfig {
            retry_delays: vec![Duration::ZERO; 5],
            max_retries: 0,
            ..WebhookEngineConfig::default()
        };
        let webhooks =
            Arc::new(WebhookEngine::new(Arc::clone(&store), engine_config).unwrap());
        let processor = RequestProcessor::new(
            Arc::clone(&cluster),
            Arc::clone(&connector),
            webhooks,
            Arc::clone(&store),
            config,
        );
        Harness {
            cluster,
            connector,
            store,
            processor,
        }
    }

    fn user() -> UserId {
        "u1".parse().unwrap()
    }

    fn agent() -> AgentId {
        "a1".parse().unwrap()
    }

    fn request() -> RequestId {
        "req_0123456789abcdef".parse().unwrap()
    }

    fn event(seq: u64, event_type: &str) -> AgentResponse {
        AgentResponse {
            request_id: request().to_string(),
            session_id: "sess_1".to_string(),
            seq,
            timestamp: 1_700_000_000_000 + i64::try_from(seq).unwrap(),
            state: AgentState::Processing as i32,
            payload: Some(agent_response::Payload::Event(Event {
                event_type: event_type.to_string(),
                event_json: br#"{"k":"v"}"#.to_vec(),
            })),
        }
    }

    async fn ready_pod(cluster: &MockClusterManager) -> PodId {
        let pod_id = PodId::new(user(), agent());
        cluster.create_pod(&pod_id).await.unwrap();
        cluster.make_ready(&pod_id, "10.0.0.7");
        pod_id
    }

    async fn webhook_bodies(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn happy_path_send_message_delivers_in_order_and_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        h.connector.push_stream(vec![
            Ok(event(1, "message.part.updated")),
            Ok(event(2, "message.part.updated")),
            Ok(event(3, "session.completed")),
        ]);

        h.processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap();

        // The single request went out with the message content.
        let sent = h.connector.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_id, request().to_string());
        match &sent[0].command {
            Some(agent_request::Command::SendMessage(msg)) => assert_eq!(msg.content, "hello"),
            other => panic!("unexpected command: {other:?}"),
        }

        // Three POSTs, in order, the last one final.
        let bodies = webhook_bodies(&server).await;
        assert_eq!(bodies.len(), 3);
        let seqs: Vec<u64> = bodies.iter().map(|b| b["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(bodies[0].get("is_final").is_none());
        assert_eq!(bodies[2]["is_final"], serde_json::json!(true));
        assert_eq!(bodies[2]["event_type"], "agent.event");
        assert_eq!(bodies[2]["opencode_event_type"], "session.completed");

        let record = h.store.get_record(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Completed);
        assert_eq!(record.seq, 3);
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn unreachable_agent_reports_error_webhook_and_fails_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        // No pod exists at all.
        let err = h
            .processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Cluster(_)));

        // The error payload is delivered asynchronously.
        let mut bodies = Vec::new();
        for _ in 0..50 {
            bodies = webhook_bodies(&server).await;
            if !bodies.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["event_type"], "agent.error");
        assert_eq!(bodies[0]["error"]["code"], "AGENT_UNREACHABLE");
        assert_eq!(bodies[0]["is_final"], serde_json::json!(true));
        assert_eq!(bodies[0]["seq"], serde_json::json!(0));

        let record = h.store.get_record(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.seq, 0);
    }

    #[tokio::test]
    async fn pod_without_ip_is_unreachable() {
        let h = harness(ProcessorConfig::default());
        let pod_id = PodId::new(user(), agent());
        h.cluster.create_pod(&pod_id).await.unwrap();

        let err = h
            .processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new("http://127.0.0.1:9/h"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Cluster(ClusterError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn stream_error_emits_final_error_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        h.connector.push_stream(vec![
            Ok(event(1, "message.part.updated")),
            Err(tonic::Status::internal("stream reset")),
        ]);

        let err = h
            .processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Stream(_)));

        let bodies = webhook_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[1]["event_type"], "agent.error");
        assert_eq!(bodies[1]["error"]["code"], "STREAM_ERROR");

        let record = h.store.get_record(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.seq, 1);
    }

    #[tokio::test]
    async fn clean_eof_without_final_event_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        h.connector
            .push_stream(vec![Ok(event(1, "message.part.updated"))]);

        h.processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap();

        let record = h.store.get_record(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Completed);
    }

    #[tokio::test]
    async fn pump_continues_when_consumer_rejects_deliveries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        h.connector.push_stream(vec![
            Ok(event(1, "message.part.updated")),
            Ok(event(2, "message.part.updated")),
            Ok(event(3, "session.completed")),
        ]);

        // Delivery failures are logged, not fatal: the pump still drains
        // the stream and the request completes.
        h.processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap();

        // One attempt per event, no retries on 4xx.
        assert_eq!(server.received_requests().await.unwrap().len(), 3);

        let record = h.store.get_record(&request()).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Completed);
        assert_eq!(record.seq, 3);
    }

    #[tokio::test]
    async fn interrupt_sends_interrupt_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        h.connector.push_stream(vec![Ok(AgentResponse {
            request_id: request().to_string(),
            seq: 1,
            payload: Some(agent_response::Payload::Complete(Complete {
                success: false,
            })),
            ..Default::default()
        })]);

        h.processor
            .interrupt(
                &user(),
                &agent(),
                &request(),
                WebhookTarget::new(format!("{}/h", server.uri())),
            )
            .await
            .unwrap();

        let sent = h.connector.sent_requests();
        assert!(matches!(
            sent[0].command,
            Some(agent_request::Command::Interrupt(_))
        ));

        let bodies = webhook_bodies(&server).await;
        assert_eq!(bodies[0]["event_type"], "agent.complete");
        assert_eq!(bodies[0]["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn create_agent_waits_for_readiness() {
        let h = harness(ProcessorConfig::default());
        let cluster = Arc::clone(&h.cluster);

        let create = tokio::spawn(async move { h.processor.create_agent(&user()).await });

        // Find the generated pod and make it ready.
        let pod_id = loop {
            let pods = cluster.list_pods_for_user(&user()).await.unwrap();
            if let Some(pod) = pods.first() {
                break PodId::new(
                    pod.user_id.clone().unwrap(),
                    pod.agent_id.clone().unwrap(),
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        cluster.make_ready(&pod_id, "10.0.0.8");

        let created = create.await.unwrap().unwrap();
        assert_eq!(created, pod_id);
    }

    #[tokio::test]
    async fn create_agent_cleans_up_on_ready_timeout() {
        let h = harness(ProcessorConfig {
            ready_timeout: Duration::from_millis(50),
            ..ProcessorConfig::default()
        });

        let err = h.processor.create_agent(&user()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::ReadyTimeout(_)));

        // The detached cleanup removes the half-created pod.
        for _ in 0..50 {
            if h.cluster.pod_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pod was not cleaned up after create failure");
    }

    #[tokio::test]
    async fn graceful_delete_swallows_shutdown_failure() {
        let h = harness(ProcessorConfig::default());
        let pod_id = ready_pod(&h.cluster).await;
        h.connector.fail_shutdown();

        h.processor
            .delete_agent(&user(), &agent(), true)
            .await
            .unwrap();

        assert_eq!(h.connector.shutdown_calls(), vec![true]);
        assert!(matches!(
            h.cluster.get_pod(&pod_id).await,
            Err(ClusterError::PodNotFound(_))
        ));
    }

    #[tokio::test]
    async fn graceful_delete_without_address_still_deletes() {
        let h = harness(ProcessorConfig::default());
        let pod_id = PodId::new(user(), agent());
        h.cluster.create_pod(&pod_id).await.unwrap();

        h.processor
            .delete_agent(&user(), &agent(), true)
            .await
            .unwrap();

        // No address, so no shutdown RPC was possible.
        assert!(h.connector.shutdown_calls().is_empty());
        assert_eq!(h.cluster.pod_count(), 0);
    }

    #[tokio::test]
    async fn non_graceful_delete_skips_shutdown() {
        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;

        h.processor
            .delete_agent(&user(), &agent(), false)
            .await
            .unwrap();

        assert!(h.connector.shutdown_calls().is_empty());
        assert_eq!(h.cluster.pod_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_request_id_does_not_abort_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(ProcessorConfig::default());
        ready_pod(&h.cluster).await;
        let url = format!("{}/h", server.uri());
        h.store
            .create_record(&request(), &agent(), &url, None)
            .await
            .unwrap();

        h.connector
            .push_stream(vec![Ok(event(1, "session.completed"))]);

        h.processor
            .send_message(
                &user(),
                &agent(),
                &request(),
                "hello".to_string(),
                WebhookTarget::new(url),
            )
            .await
            .unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
