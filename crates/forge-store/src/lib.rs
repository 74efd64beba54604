//! Delivery-record store for Forge webhook tracking.
//!
//! One row is written per outgoing command and updated as the webhook
//! engine works through the request's events. Rows are append/update-only;
//! the platform never deletes them.
//!
//! The [`DeliveryStore`] trait fronts two implementations:
//! [`PgDeliveryStore`] over Postgres via sqlx, and [`MemoryDeliveryStore`]
//! (behind `test-utils`) used by unit tests across the workspace.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::{DeliveryAttempt, DeliveryStore, PgDeliveryStore};
pub use types::{DeliveryRecord, DeliveryStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use store::memory::MemoryDeliveryStore;
