//! Cluster manager trait and Kubernetes implementation.

use forge_core::{PodId, UserId};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::WatchEvent;
use kube::{Client, Config};
use tracing::{debug, info};

use crate::pod::{build_pod, USER_ID_LABEL};
use crate::types::{ClusterConfig, PodEvent, PodPhase, PodSnapshot};
use crate::{ClusterError, Result};

/// The `ClusterManager` trait defines pod lifecycle operations.
///
/// `wait_for_pod_ready` and `restart_pod` are default-implemented on top of
/// the primitive operations, so every implementation (including the test
/// mock) shares the same wait and restart semantics.
#[async_trait::async_trait]
pub trait ClusterManager: Send + Sync {
    /// Create the pod for an agent. Does **not** wait for readiness.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::AlreadyExists`] if the workload name is
    /// taken, or an API error on transport failure.
    async fn create_pod(&self, pod_id: &PodId) -> Result<()>;

    /// Fetch a snapshot of the pod.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::PodNotFound`] if the pod does not exist.
    async fn get_pod(&self, pod_id: &PodId) -> Result<PodSnapshot>;

    /// List all pods belonging to a user, by label selector.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    async fn list_pods_for_user(&self, user_id: &UserId) -> Result<Vec<PodSnapshot>>;

    /// Request deletion of a pod. Idempotent; returns once the cluster API
    /// accepts the deletion, not once the pod disappears.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    async fn delete_pod(&self, pod_id: &PodId) -> Result<()>;

    /// Delete every pod belonging to a user, by label selector.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    async fn delete_pods_for_user(&self, user_id: &UserId) -> Result<()>;

    /// Watch one pod's event stream.
    ///
    /// The existence of the pod is checked up front so callers get a clean
    /// [`ClusterError::PodNotFound`] instead of an empty stream. The
    /// underlying watcher is closed when the returned stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::PodNotFound`] or a transport error.
    async fn watch_pod(&self, pod_id: &PodId) -> Result<BoxStream<'static, PodEvent>>;

    /// Resolve the pod's gRPC base URL (`http://{ip}:{port}`). Does not
    /// wait.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::NotReady`] while the pod has no IP.
    async fn pod_address(&self, pod_id: &PodId) -> Result<String>;

    /// Block until the pod is ready, it is deleted, or the watch fails.
    ///
    /// Takes an initial snapshot and returns immediately when it already
    /// satisfies the readiness predicate; otherwise consumes watch events
    /// until readiness or a terminal condition.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::PodDeleted`] if the pod is removed during
    /// the wait, or [`ClusterError::Watch`] if the watch fails.
    async fn wait_for_pod_ready(&self, pod_id: &PodId) -> Result<PodSnapshot> {
        let pod = self.get_pod(pod_id).await?;
        if pod.is_ready() {
            return Ok(pod);
        }

        let mut events = self.watch_pod(pod_id).await?;
        while let Some(event) = events.next().await {
            match event {
                PodEvent::Added(pod) | PodEvent::Modified(pod) => {
                    if pod.is_ready() {
                        return Ok(pod);
                    }
                }
                PodEvent::Deleted(pod) => return Err(ClusterError::PodDeleted(pod.name)),
                PodEvent::Error(msg) => return Err(ClusterError::Watch(msg)),
            }
        }

        Err(ClusterError::Watch(format!(
            "watch for {} closed before the pod became ready",
            pod_id.name()
        )))
    }

    /// Delete the pod, wait for the `Deleted` event, then create it again.
    ///
    /// # Errors
    ///
    /// Returns an error if any sub-step fails.
    async fn restart_pod(&self, pod_id: &PodId) -> Result<()> {
        // Subscribe before deleting so the Deleted event cannot be missed.
        let events = match self.watch_pod(pod_id).await {
            Ok(events) => Some(events),
            Err(ClusterError::PodNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        self.delete_pod(pod_id).await?;

        if let Some(mut events) = events {
            loop {
                match events.next().await {
                    Some(PodEvent::Deleted(_)) => break,
                    Some(PodEvent::Error(msg)) => return Err(ClusterError::Watch(msg)),
                    Some(_) => {}
                    None => {
                        return Err(ClusterError::Watch(format!(
                            "watch for {} closed before deletion completed",
                            pod_id.name()
                        )))
                    }
                }
            }
        }

        self.create_pod(pod_id).await
    }
}

/// Kubernetes-backed cluster manager.
pub struct KubeClusterManager {
    client: Client,
    config: ClusterConfig,
}

impl KubeClusterManager {
    /// Create a manager, connecting via the configured kubeconfig path or
    /// the default client chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new(config: ClusterConfig) -> Result<Self> {
        let client = match &config.kubeconfig_path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| ClusterError::Config(format!("reading {path}: {e}")))?;
                let client_config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| ClusterError::Config(e.to_string()))?;
                Client::try_from(client_config)?
            }
            None => Client::try_default().await?,
        };

        Ok(Self { client, config })
    }

    /// Create a manager with a pre-configured client. Useful for tests.
    #[must_use]
    pub fn with_client(client: Client, config: ClusterConfig) -> Self {
        Self { client, config }
    }

    /// Get a reference to the cluster configuration.
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    fn pods_api(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }
}

#[async_trait::async_trait]
impl ClusterManager for KubeClusterManager {
    async fn create_pod(&self, pod_id: &PodId) -> Result<()> {
        let pods = self.pods_api();
        let pod = build_pod(pod_id, &self.config);

        match pods.create(&PostParams::default(), &pod).await {
            Ok(_) => {
                info!(pod = %pod_id, image = %self.config.image, "created agent pod");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                Err(ClusterError::AlreadyExists(pod_id.name()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_pod(&self, pod_id: &PodId) -> Result<PodSnapshot> {
        let name = pod_id.name();
        match self.pods_api().get_opt(&name).await? {
            Some(pod) => Ok(snapshot_from(&pod)),
            None => Err(ClusterError::PodNotFound(name)),
        }
    }

    async fn list_pods_for_user(&self, user_id: &UserId) -> Result<Vec<PodSnapshot>> {
        let params = ListParams::default().labels(&format!("{USER_ID_LABEL}={user_id}"));
        let pod_list = self.pods_api().list(&params).await?;
        Ok(pod_list.items.iter().map(snapshot_from).collect())
    }

    async fn delete_pod(&self, pod_id: &PodId) -> Result<()> {
        let name = pod_id.name();
        match self.pods_api().delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(pod = %pod_id, "deleted agent pod");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(pod = %pod_id, "pod already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_pods_for_user(&self, user_id: &UserId) -> Result<()> {
        let params = ListParams::default().labels(&format!("{USER_ID_LABEL}={user_id}"));
        self.pods_api()
            .delete_collection(&DeleteParams::default(), &params)
            .await?;
        info!(user = %user_id, "deleted agent pods for user");
        Ok(())
    }

    async fn watch_pod(&self, pod_id: &PodId) -> Result<BoxStream<'static, PodEvent>> {
        // Pre-check existence so the caller gets a clean error instead of a
        // stream that never yields.
        self.get_pod(pod_id).await?;

        let api = self.pods_api();
        let name = pod_id.name();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(watch_loop(api, name, tx));

        Ok(rx.boxed())
    }

    async fn pod_address(&self, pod_id: &PodId) -> Result<String> {
        let pod = self.get_pod(pod_id).await?;
        let Some(pod_ip) = pod.pod_ip else {
            return Err(ClusterError::NotReady(pod_id.name()));
        };
        let host = self.config.node_host.as_deref().unwrap_or(&pod_ip);
        Ok(format!("http://{host}:{}", self.config.agent_port))
    }
}

/// Feed one pod's watch events into `tx` until a terminal event arrives or
/// the receiver is dropped.
///
/// Kubernetes closes watches server-side after a few minutes; those clean
/// expirations are reopened transparently. `Deleted` and watch errors end
/// the loop.
async fn watch_loop(api: Api<Pod>, name: String, mut tx: mpsc::Sender<PodEvent>) {
    let params = WatchParams::default()
        .fields(&format!("metadata.name={name}"))
        .timeout(290);

    loop {
        let stream = match api.watch(&params, "0").await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(PodEvent::Error(e.to_string())).await;
                return;
            }
        };
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(WatchEvent::Added(pod)) => PodEvent::Added(snapshot_from(&pod)),
                Ok(WatchEvent::Modified(pod)) => PodEvent::Modified(snapshot_from(&pod)),
                Ok(WatchEvent::Deleted(pod)) => {
                    let _ = tx.send(PodEvent::Deleted(snapshot_from(&pod))).await;
                    return;
                }
                Ok(WatchEvent::Bookmark(_)) => continue,
                Ok(WatchEvent::Error(e)) => {
                    let _ = tx.send(PodEvent::Error(e.message)).await;
                    return;
                }
                Err(e) => {
                    let _ = tx.send(PodEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if tx.send(event).await.is_err() {
                // Receiver dropped; the waiter is gone.
                return;
            }
        }

        if tx.is_closed() {
            return;
        }
        debug!(pod = %name, "watch expired, reopening");
    }
}

/// Extract the platform's view of a pod from the cluster object.
pub(crate) fn snapshot_from(pod: &Pod) -> PodSnapshot {
    let labels = pod.metadata.labels.as_ref();
    let user_id = labels
        .and_then(|l| l.get(USER_ID_LABEL))
        .and_then(|v| v.parse().ok());
    let agent_id = labels
        .and_then(|l| l.get(crate::pod::AGENT_ID_LABEL))
        .and_then(|v| v.parse().ok());

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from_k8s_phase)
        .unwrap_or_default();
    let pod_ip = status.and_then(|s| s.pod_ip.clone());

    let container_statuses = status.and_then(|s| s.container_statuses.as_ref());
    let has_container_statuses = container_statuses.is_some_and(|cs| !cs.is_empty());
    let containers_ready = match container_statuses {
        Some(cs) if !cs.is_empty() => cs.iter().all(|c| c.ready),
        _ => true,
    };

    PodSnapshot {
        name: pod.metadata.name.clone().unwrap_or_default(),
        user_id,
        agent_id,
        phase,
        pod_ip,
        has_container_statuses,
        containers_ready,
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        created_at: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

/// An in-memory cluster manager for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::HashMap;

    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use parking_lot::Mutex;
    use tracing::warn;

    use super::{
        BoxStream, ClusterError, ClusterManager, PodEvent, PodId, PodPhase, PodSnapshot, Result,
        StreamExt, UserId,
    };
    use crate::types::ClusterConfig;

    /// A mock cluster manager that stores pod snapshots in memory and
    /// feeds watchers through channels.
    pub struct MockClusterManager {
        config: ClusterConfig,
        pods: Mutex<HashMap<String, PodSnapshot>>,
        watchers: Mutex<HashMap<String, Vec<UnboundedSender<PodEvent>>>>,
    }

    impl Default for MockClusterManager {
        fn default() -> Self {
            Self {
                config: ClusterConfig::default(),
                pods: Mutex::new(HashMap::new()),
                watchers: Mutex::new(HashMap::new()),
            }
        }
    }

    impl MockClusterManager {
        /// Create an empty mock manager.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of pods currently stored.
        #[must_use]
        pub fn pod_count(&self) -> usize {
            self.pods.lock().len()
        }

        /// Mark a pod running with the given IP and broadcast the change.
        pub fn make_ready(&self, pod_id: &PodId, pod_ip: &str) {
            self.update(pod_id, |pod| {
                pod.phase = PodPhase::Running;
                pod.pod_ip = Some(pod_ip.to_string());
            });
        }

        /// Set a pod's phase and broadcast the change.
        pub fn set_phase(&self, pod_id: &PodId, phase: PodPhase) {
            self.update(pod_id, |pod| pod.phase = phase);
        }

        /// Set container readiness and broadcast the change.
        pub fn set_containers_ready(&self, pod_id: &PodId, ready: bool) {
            self.update(pod_id, |pod| {
                pod.has_container_statuses = true;
                pod.containers_ready = ready;
            });
        }

        fn update(&self, pod_id: &PodId, mutate: impl FnOnce(&mut PodSnapshot)) {
            let name = pod_id.name();
            let snapshot = {
                let mut pods = self.pods.lock();
                let Some(pod) = pods.get_mut(&name) else {
                    warn!(pod = %name, "mock update for unknown pod");
                    return;
                };
                mutate(pod);
                pod.clone()
            };
            self.broadcast(&name, PodEvent::Modified(snapshot));
        }

        fn broadcast(&self, name: &str, event: PodEvent) {
            let mut watchers = self.watchers.lock();
            if let Some(senders) = watchers.get_mut(name) {
                senders.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
            }
        }

        fn new_snapshot(pod_id: &PodId) -> PodSnapshot {
            PodSnapshot {
                name: pod_id.name(),
                user_id: Some(pod_id.user_id.clone()),
                agent_id: Some(pod_id.agent_id.clone()),
                phase: PodPhase::Pending,
                pod_ip: None,
                has_container_statuses: false,
                containers_ready: true,
                node_name: Some("mock-node".to_string()),
                created_at: Some(chrono::Utc::now()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ClusterManager for MockClusterManager {
        async fn create_pod(&self, pod_id: &PodId) -> Result<()> {
            let name = pod_id.name();
            let snapshot = {
                let mut pods = self.pods.lock();
                if pods.contains_key(&name) {
                    return Err(ClusterError::AlreadyExists(name));
                }
                let snapshot = Self::new_snapshot(pod_id);
                pods.insert(name.clone(), snapshot.clone());
                snapshot
            };
            self.broadcast(&name, PodEvent::Added(snapshot));
            Ok(())
        }

        async fn get_pod(&self, pod_id: &PodId) -> Result<PodSnapshot> {
            let name = pod_id.name();
            self.pods
                .lock()
                .get(&name)
                .cloned()
                .ok_or(ClusterError::PodNotFound(name))
        }

        async fn list_pods_for_user(&self, user_id: &UserId) -> Result<Vec<PodSnapshot>> {
            Ok(self
                .pods
                .lock()
                .values()
                .filter(|p| p.user_id.as_ref() == Some(user_id))
                .cloned()
                .collect())
        }

        async fn delete_pod(&self, pod_id: &PodId) -> Result<()> {
            let name = pod_id.name();
            let removed = self.pods.lock().remove(&name);
            if let Some(snapshot) = removed {
                self.broadcast(&name, PodEvent::Deleted(snapshot));
            }
            Ok(())
        }

        async fn delete_pods_for_user(&self, user_id: &UserId) -> Result<()> {
            let removed: Vec<PodSnapshot> = {
                let mut pods = self.pods.lock();
                let names: Vec<String> = pods
                    .values()
                    .filter(|p| p.user_id.as_ref() == Some(user_id))
                    .map(|p| p.name.clone())
                    .collect();
                names.iter().filter_map(|n| pods.remove(n)).collect()
            };
            for snapshot in removed {
                let name = snapshot.name.clone();
                self.broadcast(&name, PodEvent::Deleted(snapshot));
            }
            Ok(())
        }

        async fn watch_pod(&self, pod_id: &PodId) -> Result<BoxStream<'static, PodEvent>> {
            let name = pod_id.name();
            let snapshot = self
                .pods
                .lock()
                .get(&name)
                .cloned()
                .ok_or_else(|| ClusterError::PodNotFound(name.clone()))?;

            let (tx, rx) = unbounded();
            // Synthetic initial event, mirroring a watch from the zero
            // resource version.
            let _ = tx.unbounded_send(PodEvent::Added(snapshot));
            self.watchers.lock().entry(name).or_default().push(tx);

            Ok(rx.boxed())
        }

        async fn pod_address(&self, pod_id: &PodId) -> Result<String> {
            let pod = self.get_pod(pod_id).await?;
            let Some(pod_ip) = pod.pod_ip else {
                return Err(ClusterError::NotReady(pod_id.name()));
            };
            let host = self.config.node_host.as_deref().unwrap_or(&pod_ip);
            Ok(format!("http://{host}:{}", self.config.agent_port))
        }
    }
}
