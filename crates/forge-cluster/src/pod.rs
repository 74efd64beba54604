//! Pod specification builder.
//!
//! Builds the fixed agent pod template, parameterized by `(user_id,
//! agent_id)` and the cluster configuration.

use std::collections::BTreeMap;

use forge_core::PodId;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Pod, PodSpec, Probe, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::ClusterConfig;

/// Label selecting every pod managed by this platform.
pub const APP_LABEL: &str = "forge-agent";

/// Label carrying the owning user's identifier.
pub const USER_ID_LABEL: &str = "user-id";

/// Label carrying the agent's identifier.
pub const AGENT_ID_LABEL: &str = "agent-id";

/// Build the pod spec for one agent workload.
#[must_use]
pub fn build_pod(pod_id: &PodId, config: &ClusterConfig) -> Pod {
    Pod {
        metadata: build_metadata(pod_id, config),
        spec: Some(PodSpec {
            containers: vec![build_container(pod_id, config)],
            // Agents are one-shot workloads; a terminated container surfaces
            // as Succeeded/Failed instead of restarting silently.
            restart_policy: Some("Never".to_string()),
            termination_grace_period_seconds: Some(30),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_metadata(pod_id: &PodId, config: &ClusterConfig) -> ObjectMeta {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APP_LABEL.to_string());
    labels.insert(USER_ID_LABEL.to_string(), pod_id.user_id.to_string());
    labels.insert(AGENT_ID_LABEL.to_string(), pod_id.agent_id.to_string());

    ObjectMeta {
        name: Some(pod_id.name()),
        namespace: Some(config.namespace.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn build_container(pod_id: &PodId, config: &ClusterConfig) -> Container {
    Container {
        name: "agent".to_string(),
        image: Some(config.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(config.agent_port),
            name: Some("grpc".to_string()),
            ..Default::default()
        }]),
        env: Some(build_env_vars(pod_id, config)),
        readiness_probe: Some(build_readiness_probe(config)),
        ..Default::default()
    }
}

fn build_env_vars(pod_id: &PodId, config: &ClusterConfig) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: "FORGE_USER_ID".to_string(),
            value: Some(pod_id.user_id.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "FORGE_AGENT_ID".to_string(),
            value: Some(pod_id.agent_id.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "FORGE_AGENT_PORT".to_string(),
            value: Some(config.agent_port.to_string()),
            ..Default::default()
        },
    ]
}

fn build_readiness_probe(config: &ClusterConfig) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(i32::from(config.agent_port)),
            ..Default::default()
        }),
        initial_delay_seconds: Some(2),
        period_seconds: Some(5),
        timeout_seconds: Some(3),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pod_id() -> PodId {
        PodId::new("u1".parse().unwrap(), "agent-17".parse().unwrap())
    }

    #[test]
    fn build_pod_has_required_fields() {
        let pod_id = test_pod_id();
        let config = ClusterConfig::default();

        let pod = build_pod(&pod_id, &config);

        let meta = &pod.metadata;
        assert_eq!(meta.name.as_deref(), Some("u1-agent-17"));
        assert_eq!(meta.namespace.as_deref(), Some("default"));

        let labels = meta.labels.as_ref().unwrap();
        assert_eq!(labels.get("app"), Some(&APP_LABEL.to_string()));
        assert_eq!(labels.get(USER_ID_LABEL), Some(&"u1".to_string()));
        assert_eq!(labels.get(AGENT_ID_LABEL), Some(&"agent-17".to_string()));

        let pod_spec = pod.spec.as_ref().unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));

        let container = &pod_spec.containers[0];
        assert_eq!(container.name, "agent");
        assert_eq!(container.image.as_deref(), Some(config.image.as_str()));
        assert!(container.readiness_probe.is_some());
    }

    #[test]
    fn build_pod_exposes_single_agent_port() {
        let pod = build_pod(&test_pod_id(), &ClusterConfig::default());
        let container = &pod.spec.as_ref().unwrap().containers[0];

        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].container_port, 50051);
        assert_eq!(ports[0].name.as_deref(), Some("grpc"));
    }

    #[test]
    fn build_pod_sets_identity_env() {
        let pod = build_pod(&test_pod_id(), &ClusterConfig::default());
        let container = &pod.spec.as_ref().unwrap().containers[0];

        let env = container.env.as_ref().unwrap();
        let names: Vec<_> = env.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"FORGE_USER_ID"));
        assert!(names.contains(&"FORGE_AGENT_ID"));
        assert!(names.contains(&"FORGE_AGENT_PORT"));

        let user = env.iter().find(|e| e.name == "FORGE_USER_ID").unwrap();
        assert_eq!(user.value.as_deref(), Some("u1"));
    }
}
