//! Identifier types for the Forge platform.
//!
//! User and agent identifiers are opaque strings supplied by the consumer.
//! They are validated against the DNS-1123 label rules because the pair is
//! concatenated into the workload name handed to the cluster.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Maximum length of a single identifier segment.
///
/// Matches the Kubernetes label-value limit so identifiers can double as
/// label values unmodified.
const MAX_ID_LEN: usize = 63;

fn validate_segment(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong {
            max: MAX_ID_LEN,
            got: s.len(),
        });
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    if !s.chars().all(valid_char) {
        return Err(IdError::InvalidCharacter);
    }
    let edges_ok = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    // chars().all above guarantees the string is non-empty ASCII
    if !edges_ok(s.chars().next().unwrap_or('-')) || !edges_ok(s.chars().last().unwrap_or('-')) {
        return Err(IdError::InvalidEdge);
    }
    Ok(())
}

/// An opaque user identifier supplied by the consumer.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_segment(s)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// An opaque agent identifier.
///
/// Usually generated by [`AgentId::generate`] when the platform provisions
/// the workload, but consumers may address agents they created earlier by
/// passing the identifier back verbatim.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Generate a fresh agent identifier from the high-resolution clock.
    #[must_use]
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(format!("agent-{nanos}"))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AgentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_segment(s)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

/// The `(user_id, agent_id)` pair addressing one agent workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodId {
    /// Owner of the workload.
    pub user_id: UserId,
    /// The agent within the owner's namespace.
    pub agent_id: AgentId,
}

impl PodId {
    /// Create a pod identity from its two segments.
    #[must_use]
    pub fn new(user_id: UserId, agent_id: AgentId) -> Self {
        Self { user_id, agent_id }
    }

    /// The canonical workload name, `"{user_id}-{agent_id}"`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}-{}", self.user_id, self.agent_id)
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.user_id, self.agent_id)
    }
}

/// The caller-visible identifier of one command.
///
/// Consumer-supplied values are kept verbatim; generated values take the
/// form `req_` followed by 16 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("req_{}", hex::encode(bytes)))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RequestId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RequestId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier is empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier exceeds the maximum length.
    #[error("identifier too long: maximum {max} characters, got {got}")]
    TooLong {
        /// The maximum allowed length.
        max: usize,
        /// The actual length.
        got: usize,
    },

    /// The identifier contains a character outside `[a-z0-9-]`.
    #[error("identifier must contain only lowercase alphanumerics and hyphens")]
    InvalidCharacter,

    /// The identifier starts or ends with a hyphen.
    #[error("identifier must start and end with an alphanumeric character")]
    InvalidEdge,
}
