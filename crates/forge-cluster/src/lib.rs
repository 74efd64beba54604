//! Kubernetes pod lifecycle manager for Forge agent workloads.
//!
//! This crate provides the [`ClusterManager`] trait and the
//! [`KubeClusterManager`] implementation: a thin wrapper over the cluster API
//! that creates, inspects, watches, and deletes one pod per agent, resolves
//! a pod's gRPC base URL, and blocks until a pod is ready.
//!
//! The manager never retries cluster calls itself; transport failures are
//! surfaced to the caller. The only state it holds is a client handle and
//! configuration.
//!
//! # Example
//!
//! ```no_run
//! use forge_cluster::{ClusterConfig, ClusterManager, KubeClusterManager};
//! use forge_core::PodId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = KubeClusterManager::new(ClusterConfig::default()).await?;
//!
//! let pod_id = PodId::new("u1".parse()?, "a1".parse()?);
//! manager.create_pod(&pod_id).await?;
//! let pod = manager.wait_for_pod_ready(&pod_id).await?;
//! println!("agent reachable at {}", manager.pod_address(&pod_id).await?);
//! # let _ = pod;
//! # Ok(())
//! # }
//! ```
//!
//! For tests without a cluster, enable the `test-utils` feature and use
//! [`MockClusterManager`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod kube;
pub mod pod;
pub mod types;

pub use error::{ClusterError, Result};
pub use kube::{ClusterManager, KubeClusterManager};
pub use types::{ClusterConfig, PodEvent, PodPhase, PodSnapshot};

#[cfg(any(test, feature = "test-utils"))]
pub use kube::mock::MockClusterManager;
