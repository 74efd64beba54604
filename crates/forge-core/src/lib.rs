//! Core types for the Forge platform.
//!
//! This crate provides the identifier types shared by every other crate:
//!
//! - **`UserId` / `AgentId`**: opaque, consumer-supplied identifiers that
//!   together address one agent workload
//! - **`PodId`**: the `(user_id, agent_id)` pair and its canonical workload
//!   name
//! - **`RequestId`**: the caller-visible identifier of a single command
//!
//! # Example
//!
//! ```
//! use forge_core::{AgentId, PodId, RequestId, UserId};
//!
//! let user_id: UserId = "u1".parse().unwrap();
//! let agent_id: AgentId = "a1".parse().unwrap();
//! let pod_id = PodId::new(user_id, agent_id);
//! assert_eq!(pod_id.name(), "u1-a1");
//!
//! let request_id = RequestId::generate();
//! assert!(request_id.as_str().starts_with("req_"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{AgentId, IdError, PodId, RequestId, UserId};
