//! Domain types persisted by the delivery store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one delivery record.
///
/// `Completed` and `Failed` are terminal; the store refuses to move a
/// record out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created, no delivery started yet.
    Pending,
    /// The response pump is forwarding events.
    Delivering,
    /// A final event was delivered or the stream ended cleanly.
    Completed,
    /// The request ended without a clean terminal event.
    Failed,
}

impl DeliveryStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivering" => Some(Self::Delivering),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of webhook delivery state, keyed by `request_id`.
///
/// The `consecutive_failures` and `circuit_open_until` columns are
/// advisory copies of the in-process circuit state, written for diagnostic
/// queries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Surrogate identifier.
    pub id: i64,
    /// Caller-visible request identifier; unique across all deliveries.
    pub request_id: String,
    /// Target agent.
    pub agent_id: String,
    /// Destination URL; the circuit breaker is keyed off this value.
    pub webhook_url: String,
    /// SHA-256 fingerprint of the signing secret, never the secret itself.
    pub webhook_secret_hash: Option<String>,
    /// Highest event ordinal observed for this request so far.
    pub seq: i64,
    /// Last event category forwarded.
    pub last_event_type: Option<String>,
    /// Current status.
    pub status: DeliveryStatus,
    /// Delivery attempts made for the latest event.
    pub attempt_count: i32,
    /// When the last attempt ran.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error from the last failed attempt.
    pub last_error: Option<String>,
    /// Scheduled retry time. Present in the schema for a durable retry
    /// queue; the synchronous engine never sets it.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Rolling failure count for this row's webhook URL.
    pub consecutive_failures: i32,
    /// If set and in the future, the URL's circuit was open at the last
    /// observation.
    pub circuit_open_until: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Terminal-completion time.
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Delivering,
            DeliveryStatus::Completed,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeliveryStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Completed.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Delivering.is_terminal());
    }
}
