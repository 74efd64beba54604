//! Error types for the cluster manager.

use thiserror::Error;

/// Errors that can occur during cluster operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Kubernetes API transport error.
    #[error("cluster API error: {0}")]
    Api(#[from] kube::Error),

    /// A workload with the same name already exists.
    #[error("pod already exists: {0}")]
    AlreadyExists(String),

    /// The pod does not exist.
    #[error("pod not found: {0}")]
    PodNotFound(String),

    /// The pod exists but has no network address yet.
    #[error("pod not ready: {0}")]
    NotReady(String),

    /// The pod was deleted while a wait was in progress.
    #[error("pod deleted: {0}")]
    PodDeleted(String),

    /// The watch stream failed or closed before a terminal event.
    #[error("watch failed: {0}")]
    Watch(String),

    /// Client or configuration error.
    #[error("cluster configuration error: {0}")]
    Config(String),
}

/// A specialized Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
