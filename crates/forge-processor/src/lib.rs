//! Request processor for the Forge platform.
//!
//! The processor is the composition point of the control plane: it resolves
//! a logical agent to a reachable RPC endpoint through the cluster manager,
//! drives one request/response cycle over the agent's bidirectional stream,
//! and hands every response to the webhook engine.
//!
//! The HTTP surface owns a processor; the processor owns references to the
//! cluster manager, agent connector, webhook engine, and delivery store.
//! Nothing points back up — the object graph is a DAG.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod processor;
pub mod types;

pub use error::{ProcessorError, Result};
pub use processor::{Processor, RequestProcessor};
pub use types::ProcessorConfig;
