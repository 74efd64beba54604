//! The webhook delivery engine.

use std::sync::Arc;

use chrono::Utc;
use forge_core::RequestId;
use forge_store::{DeliveryAttempt, DeliveryStore};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{debug, error, warn};

use crate::circuit::CircuitBreaker;
use crate::config::{WebhookEngineConfig, WebhookTarget};
use crate::payload::WebhookPayload;
use crate::signature;
use crate::{Result, WebhookError};

/// `User-Agent` sent on every webhook POST.
const PLATFORM_USER_AGENT: &str = "Forge-Platform/1.0";

/// How much of an error response body is kept for diagnostics.
const BODY_SNIPPET_LIMIT: usize = 1024;

/// Delivers signed webhook payloads with bounded retries and a per-URL
/// circuit breaker, persisting attempt state through the delivery store.
pub struct WebhookEngine<S> {
    http: reqwest::Client,
    circuits: CircuitBreaker,
    store: Arc<S>,
    config: WebhookEngineConfig,
}

impl<S: DeliveryStore> WebhookEngine<S> {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(store: Arc<S>, config: WebhookEngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.webhook_timeout)
            .build()
            .map_err(|e| WebhookError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            circuits: CircuitBreaker::new(config.circuit_threshold, config.circuit_timeout),
            store,
            config,
        })
    }

    /// The engine's circuit breaker, for introspection.
    #[must_use]
    pub fn circuits(&self) -> &CircuitBreaker {
        &self.circuits
    }

    /// Deliver one payload, retrying per the delay schedule.
    ///
    /// 2xx responses succeed and close the URL's circuit. 4xx responses
    /// fail immediately without retrying. Anything else (network errors,
    /// 5xx, stray 3xx) is retried until the schedule is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::CircuitOpen`] without any HTTP call while
    /// the URL's circuit is open, [`WebhookError::ClientError`] on a 4xx,
    /// or [`WebhookError::RetriesExhausted`] after the final attempt.
    pub async fn deliver(&self, target: &WebhookTarget, payload: &WebhookPayload) -> Result<()> {
        if self.circuits.is_open(&target.url) {
            return Err(WebhookError::CircuitOpen(target.url.clone()));
        }

        let attempts = self.config.attempt_count();
        let mut last_error: Option<WebhookError> = None;

        for attempt in 0..attempts {
            let delay = self
                .config
                .retry_delays
                .get(attempt)
                .copied()
                .unwrap_or_default();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.deliver_once(target, payload).await {
                Ok(()) => {
                    self.circuits.record_success(&target.url);
                    self.persist_attempt(payload, None, 0, None).await;
                    debug!(
                        url = %target.url,
                        request_id = %payload.request_id,
                        seq = payload.seq,
                        attempt,
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let state = self.circuits.record_failure(&target.url);
                    self.persist_attempt(
                        payload,
                        Some(err.to_string()),
                        state.consecutive_failures,
                        state.open_until,
                    )
                    .await;

                    if err.is_client_error() {
                        warn!(
                            url = %target.url,
                            request_id = %payload.request_id,
                            error = %err,
                            "consumer rejected webhook, not retrying"
                        );
                        return Err(err);
                    }

                    warn!(
                        url = %target.url,
                        request_id = %payload.request_id,
                        attempt,
                        error = %err,
                        "webhook attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(WebhookError::RetriesExhausted {
            url: target.url.clone(),
            attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                WebhookError::Config("retry loop ran zero attempts".to_string())
            })),
        })
    }

    /// Make exactly one delivery attempt.
    ///
    /// # Errors
    ///
    /// Classifies the outcome: 2xx is success, 4xx is a client error, and
    /// everything else is a generic failure carrying the status and the
    /// first KiB of the response body.
    pub async fn deliver_once(
        &self,
        target: &WebhookTarget,
        payload: &WebhookPayload,
    ) -> Result<()> {
        let body = serde_json::to_string(payload)?;

        let mut request = self
            .http
            .post(&target.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, PLATFORM_USER_AGENT);

        if let Some(secret) = target.signing_secret() {
            let timestamp = Utc::now().timestamp();
            if let Some(sig) = signature::sign(secret, timestamp, &body) {
                request = request
                    .header(signature::TIMESTAMP_HEADER, timestamp.to_string())
                    .header(signature::SIGNATURE_HEADER, sig);
            }
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let snippet = body_snippet(response).await;
        if status.is_client_error() {
            Err(WebhookError::ClientError {
                status: status.as_u16(),
                body: snippet,
            })
        } else {
            Err(WebhookError::Failed {
                status: status.as_u16(),
                body: snippet,
            })
        }
    }

    /// Launch a detached delivery with its own deadline. Errors are
    /// logged, never reported.
    pub fn deliver_async(self: &Arc<Self>, target: WebhookTarget, payload: WebhookPayload)
    where
        S: 'static,
    {
        let engine = Arc::clone(self);
        let deadline = engine.config.async_delivery_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(deadline, engine.deliver(&target, &payload)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        url = %target.url,
                        request_id = %payload.request_id,
                        error = %err,
                        "async webhook delivery failed"
                    );
                }
                Err(_) => {
                    error!(
                        url = %target.url,
                        request_id = %payload.request_id,
                        "async webhook delivery timed out"
                    );
                }
            }
        });
    }

    /// Best-effort persistence of per-attempt state; store failures are
    /// logged and swallowed.
    async fn persist_attempt(
        &self,
        payload: &WebhookPayload,
        attempt_error: Option<String>,
        consecutive_failures: u32,
        circuit_open_until: Option<chrono::DateTime<Utc>>,
    ) {
        let Ok(request_id) = payload.request_id.parse::<RequestId>() else {
            return;
        };

        let attempt = DeliveryAttempt {
            error: attempt_error,
            consecutive_failures: i32::try_from(consecutive_failures).unwrap_or(i32::MAX),
            circuit_open_until,
        };
        if let Err(err) = self.store.record_attempt(&request_id, &attempt).await {
            warn!(
                request_id = %request_id,
                error = %err,
                "failed to persist delivery attempt"
            );
        }
    }
}

async fn body_snippet(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    if text.len() > BODY_SNIPPET_LIMIT {
        let mut end = BODY_SNIPPET_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forge_core::{AgentId, RequestId};
    use forge_store::MemoryDeliveryStore;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_config() -> WebhookEngineConfig {
        WebhookEngineConfig {
            retry_delays: vec![Duration::ZERO; 5],
            ..WebhookEngineConfig::default()
        }
    }

    fn payload(request_id: &str) -> WebhookPayload {
        let agent_id: AgentId = "a1".parse().unwrap();
        let request_id: RequestId = request_id.parse().unwrap();
        WebhookPayload::stream_error(&agent_id, &request_id, "test payload")
    }

    async fn engine_with_store(
        config: WebhookEngineConfig,
    ) -> (Arc<WebhookEngine<MemoryDeliveryStore>>, Arc<MemoryDeliveryStore>) {
        let store = Arc::new(MemoryDeliveryStore::new());
        let engine = Arc::new(WebhookEngine::new(Arc::clone(&store), config).unwrap());
        (engine, store)
    }

    async fn create_record(store: &MemoryDeliveryStore, request_id: &str, url: &str) {
        store
            .create_record(
                &request_id.parse().unwrap(),
                &"a1".parse().unwrap(),
                url,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_delivery_posts_json_with_platform_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("Content-Type", "application/json"))
            .and(header("User-Agent", "Forge-Platform/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        engine.deliver(&target, &payload("req_1")).await.unwrap();
    }

    #[tokio::test]
    async fn unsigned_delivery_has_no_signature_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));
        engine.deliver(&target, &payload("req_1")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("X-Forge-Signature"));
        assert!(!requests[0].headers.contains_key("X-Forge-Timestamp"));
    }

    #[tokio::test]
    async fn signed_delivery_carries_verifiable_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::with_secret(format!("{}/hook", server.uri()), "s3cr3t");
        engine.deliver(&target, &payload("req_1")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];

        let timestamp: i64 = request.headers["X-Forge-Timestamp"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = String::from_utf8(request.body.clone()).unwrap();
        let expected = signature::sign("s3cr3t", timestamp, &body).unwrap();
        assert_eq!(request.headers["X-Forge-Signature"].to_str().unwrap(), expected);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let (engine, store) = engine_with_store(fast_config()).await;
        let url = format!("{}/hook", server.uri());
        create_record(&store, "req_1", &url).await;
        let target = WebhookTarget::new(url);

        let err = engine.deliver(&target, &payload("req_1")).await.unwrap_err();
        assert!(err.is_client_error());

        // One failed attempt recorded against the row.
        let record = store.get_record(&"req_1".parse().unwrap()).await.unwrap();
        assert_eq!(record.attempt_count, 1);
        assert_eq!(record.consecutive_failures, 1);
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        engine.deliver(&target, &payload("req_1")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        // Success closed the accounting for this URL.
        assert_eq!(
            engine.circuits().state(&target.url).unwrap().consecutive_failures,
            0
        );
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_last_cause() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        let err = engine.deliver(&target, &payload("req_1")).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::RetriesExhausted { attempts: 5, .. }
        ));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 5);
    }

    #[tokio::test]
    async fn zero_max_retries_means_exactly_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = WebhookEngineConfig {
            max_retries: 0,
            ..fast_config()
        };
        let (engine, _store) = engine_with_store(config).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        let err = engine.deliver(&target, &payload("req_1")).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::RetriesExhausted { attempts: 1, .. }
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_blocks_without_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        // Five consecutive failures reach the default threshold.
        let _ = engine.deliver(&target, &payload("req_1")).await;
        assert!(engine.circuits().is_open(&target.url));
        let before = server.received_requests().await.unwrap().len();

        let err = engine.deliver(&target, &payload("req_2")).await.unwrap_err();
        assert!(matches!(err, WebhookError::CircuitOpen(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn circuit_recloses_after_timeout_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = WebhookEngineConfig {
            max_retries: 1,
            circuit_threshold: 2,
            circuit_timeout: Duration::from_millis(40),
            ..fast_config()
        };
        let (engine, _store) = engine_with_store(config).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        // Two failures open the circuit.
        let _ = engine.deliver(&target, &payload("req_1")).await;
        assert!(engine.circuits().is_open(&target.url));

        // After the window the probe goes through and closes it.
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.deliver(&target, &payload("req_2")).await.unwrap();
        assert!(!engine.circuits().is_open(&target.url));
        assert_eq!(
            engine.circuits().state(&target.url).unwrap().consecutive_failures,
            0
        );
    }

    #[tokio::test]
    async fn async_delivery_completes_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (engine, _store) = engine_with_store(fast_config()).await;
        let target = WebhookTarget::new(format!("{}/hook", server.uri()));

        engine.deliver_async(target, payload("req_1"));

        // Wait for the detached task to land the POST.
        for _ in 0..50 {
            if !server.received_requests().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("async delivery never reached the consumer");
    }
}
