//! The `DeliveryStore` trait and its Postgres implementation.

use chrono::{DateTime, Utc};
use forge_core::{AgentId, RequestId};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::types::{DeliveryRecord, DeliveryStatus};
use crate::{Result, StoreError};

/// Per-attempt state persisted after each webhook delivery attempt.
///
/// The circuit fields mirror the in-process breaker for diagnostics; the
/// authoritative state lives in the webhook engine.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAttempt {
    /// Error from the attempt, `None` on success.
    pub error: Option<String>,
    /// Rolling failure count for the record's webhook URL.
    pub consecutive_failures: i32,
    /// Circuit-open deadline for the URL, if open.
    pub circuit_open_until: Option<DateTime<Utc>>,
}

/// The delivery store: thin, explicit wrappers over a fixed set of
/// queries. Transactions are not required — each operation is a single
/// statement.
#[async_trait::async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Insert a `pending` record for a new request.
    ///
    /// Stores the SHA-256 fingerprint of `secret` when one is supplied,
    /// never the secret itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when a record with the same
    /// `request_id` already exists, which lets callers retry safely.
    async fn create_record(
        &self,
        request_id: &RequestId,
        agent_id: &AgentId,
        webhook_url: &str,
        secret: Option<&str>,
    ) -> Result<()>;

    /// Transition a `pending` record to `delivering`.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure. No-op for records that have
    /// already progressed.
    async fn mark_delivering(&self, request_id: &RequestId) -> Result<()>;

    /// Record the highest observed event ordinal and its category.
    ///
    /// `seq` never decreases, regardless of call order.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    async fn update_seq(&self, request_id: &RequestId, seq: u64, event_type: &str) -> Result<()>;

    /// Record the outcome of one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    async fn record_attempt(&self, request_id: &RequestId, attempt: &DeliveryAttempt)
        -> Result<()>;

    /// Terminal transition to `completed`; sets `completed_at` and resets
    /// `consecutive_failures`.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure. Terminal records are left
    /// untouched.
    async fn mark_completed(&self, request_id: &RequestId) -> Result<()>;

    /// Terminal transition to `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure. Terminal records are left
    /// untouched.
    async fn mark_failed(&self, request_id: &RequestId) -> Result<()>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    async fn get_record(&self, request_id: &RequestId) -> Result<DeliveryRecord>;

    /// List all records targeting one agent.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<DeliveryRecord>>;
}

/// SHA-256 fingerprint of a webhook secret.
#[must_use]
pub fn secret_fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn seq_to_i64(seq: u64) -> i64 {
    i64::try_from(seq).unwrap_or(i64::MAX)
}

/// Postgres-backed delivery store.
#[derive(Debug, Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(crate::schema::SCHEMA)
            .execute(&self.pool)
            .await?;
        debug!("delivery store schema applied");
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<DeliveryRecord> {
        let status: String = row.try_get("status")?;
        let status = DeliveryStatus::parse(&status)
            .ok_or_else(|| StoreError::Database(format!("unknown delivery status: {status}")))?;

        Ok(DeliveryRecord {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            agent_id: row.try_get("agent_id")?,
            webhook_url: row.try_get("webhook_url")?,
            webhook_secret_hash: row.try_get("webhook_secret_hash")?,
            seq: row.try_get("seq")?,
            last_event_type: row.try_get("last_event_type")?,
            status,
            attempt_count: row.try_get("attempt_count")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            last_error: row.try_get("last_error")?,
            next_retry_at: row.try_get("next_retry_at")?,
            consecutive_failures: row.try_get("consecutive_failures")?,
            circuit_open_until: row.try_get("circuit_open_until")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait::async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn create_record(
        &self,
        request_id: &RequestId,
        agent_id: &AgentId,
        webhook_url: &str,
        secret: Option<&str>,
    ) -> Result<()> {
        let secret_hash = secret
            .filter(|s| !s.is_empty())
            .map(secret_fingerprint);

        let result = sqlx::query(
            "INSERT INTO webhook_deliveries (request_id, agent_id, webhook_url, webhook_secret_hash, status) \
             VALUES ($1, $2, $3, $4, 'pending')",
        )
        .bind(request_id.as_str())
        .bind(agent_id.as_str())
        .bind(webhook_url)
        .bind(secret_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(request_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_delivering(&self, request_id: &RequestId) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries SET status = 'delivering', updated_at = NOW() \
             WHERE request_id = $1 AND status = 'pending'",
        )
        .bind(request_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_seq(&self, request_id: &RequestId, seq: u64, event_type: &str) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries \
             SET seq = GREATEST(seq, $2), last_event_type = $3, updated_at = NOW() \
             WHERE request_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(request_id.as_str())
        .bind(seq_to_i64(seq))
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_attempt(
        &self,
        request_id: &RequestId,
        attempt: &DeliveryAttempt,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries \
             SET attempt_count = attempt_count + 1, last_attempt_at = NOW(), last_error = $2, \
                 consecutive_failures = $3, circuit_open_until = $4, updated_at = NOW() \
             WHERE request_id = $1",
        )
        .bind(request_id.as_str())
        .bind(attempt.error.as_deref())
        .bind(attempt.consecutive_failures)
        .bind(attempt.circuit_open_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(&self, request_id: &RequestId) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries \
             SET status = 'completed', completed_at = NOW(), consecutive_failures = 0, \
                 updated_at = NOW() \
             WHERE request_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(request_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, request_id: &RequestId) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries \
             SET status = 'failed', updated_at = NOW() \
             WHERE request_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(request_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_record(&self, request_id: &RequestId) -> Result<DeliveryRecord> {
        let row = sqlx::query("SELECT * FROM webhook_deliveries WHERE request_id = $1")
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Self::record_from_row(&row)
    }

    async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<DeliveryRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM webhook_deliveries WHERE agent_id = $1 ORDER BY created_at",
        )
        .bind(agent_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::record_from_row).collect()
    }
}

/// An in-memory delivery store for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::{
        secret_fingerprint, seq_to_i64, AgentId, DeliveryAttempt, DeliveryRecord, DeliveryStatus,
        DeliveryStore, RequestId, Result, StoreError, Utc,
    };

    /// A mock store with the same transition semantics as the Postgres
    /// implementation.
    #[derive(Default)]
    pub struct MemoryDeliveryStore {
        records: Mutex<HashMap<String, DeliveryRecord>>,
        next_id: Mutex<i64>,
    }

    impl MemoryDeliveryStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of stored records.
        #[must_use]
        pub fn record_count(&self) -> usize {
            self.records.lock().len()
        }

        fn with_live_record(
            &self,
            request_id: &RequestId,
            mutate: impl FnOnce(&mut DeliveryRecord),
        ) {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(request_id.as_str()) {
                if record.status.is_terminal() {
                    return;
                }
                mutate(record);
                record.updated_at = Utc::now();
            }
        }
    }

    #[async_trait::async_trait]
    impl DeliveryStore for MemoryDeliveryStore {
        async fn create_record(
            &self,
            request_id: &RequestId,
            agent_id: &AgentId,
            webhook_url: &str,
            secret: Option<&str>,
        ) -> Result<()> {
            let mut records = self.records.lock();
            if records.contains_key(request_id.as_str()) {
                return Err(StoreError::Duplicate(request_id.to_string()));
            }

            let mut next_id = self.next_id.lock();
            *next_id += 1;

            let now = Utc::now();
            records.insert(
                request_id.to_string(),
                DeliveryRecord {
                    id: *next_id,
                    request_id: request_id.to_string(),
                    agent_id: agent_id.to_string(),
                    webhook_url: webhook_url.to_string(),
                    webhook_secret_hash: secret
                        .filter(|s| !s.is_empty())
                        .map(secret_fingerprint),
                    seq: 0,
                    last_event_type: None,
                    status: DeliveryStatus::Pending,
                    attempt_count: 0,
                    last_attempt_at: None,
                    last_error: None,
                    next_retry_at: None,
                    consecutive_failures: 0,
                    circuit_open_until: None,
                    created_at: now,
                    updated_at: now,
                    completed_at: None,
                },
            );
            Ok(())
        }

        async fn mark_delivering(&self, request_id: &RequestId) -> Result<()> {
            self.with_live_record(request_id, |record| {
                if record.status == DeliveryStatus::Pending {
                    record.status = DeliveryStatus::Delivering;
                }
            });
            Ok(())
        }

        async fn update_seq(
            &self,
            request_id: &RequestId,
            seq: u64,
            event_type: &str,
        ) -> Result<()> {
            self.with_live_record(request_id, |record| {
                record.seq = record.seq.max(seq_to_i64(seq));
                record.last_event_type = Some(event_type.to_string());
            });
            Ok(())
        }

        async fn record_attempt(
            &self,
            request_id: &RequestId,
            attempt: &DeliveryAttempt,
        ) -> Result<()> {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(request_id.as_str()) {
                record.attempt_count += 1;
                record.last_attempt_at = Some(Utc::now());
                record.last_error = attempt.error.clone();
                record.consecutive_failures = attempt.consecutive_failures;
                record.circuit_open_until = attempt.circuit_open_until;
                record.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn mark_completed(&self, request_id: &RequestId) -> Result<()> {
            self.with_live_record(request_id, |record| {
                record.status = DeliveryStatus::Completed;
                record.completed_at = Some(Utc::now());
                record.consecutive_failures = 0;
            });
            Ok(())
        }

        async fn mark_failed(&self, request_id: &RequestId) -> Result<()> {
            self.with_live_record(request_id, |record| {
                record.status = DeliveryStatus::Failed;
            });
            Ok(())
        }

        async fn get_record(&self, request_id: &RequestId) -> Result<DeliveryRecord> {
            self.records
                .lock()
                .get(request_id.as_str())
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<DeliveryRecord>> {
            let mut records: Vec<DeliveryRecord> = self
                .records
                .lock()
                .values()
                .filter(|r| r.agent_id == agent_id.as_str())
                .cloned()
                .collect();
            records.sort_by_key(|r| r.id);
            Ok(records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDeliveryStore;
    use super::*;

    fn request_id(s: &str) -> RequestId {
        s.parse().unwrap()
    }

    fn agent_id(s: &str) -> AgentId {
        s.parse().unwrap()
    }

    async fn store_with_record(request: &str) -> MemoryDeliveryStore {
        let store = MemoryDeliveryStore::new();
        store
            .create_record(
                &request_id(request),
                &agent_id("a1"),
                "https://c.test/h",
                Some("s3cr3t"),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_stores_fingerprint_not_secret() {
        let store = store_with_record("req_1").await;
        let record = store.get_record(&request_id("req_1")).await.unwrap();

        let hash = record.webhook_secret_hash.unwrap();
        assert_eq!(hash, secret_fingerprint("s3cr3t"));
        assert_ne!(hash, "s3cr3t");
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.seq, 0);
    }

    #[tokio::test]
    async fn empty_secret_stores_no_fingerprint() {
        let store = MemoryDeliveryStore::new();
        store
            .create_record(&request_id("req_1"), &agent_id("a1"), "https://c.test/h", Some(""))
            .await
            .unwrap();
        let record = store.get_record(&request_id("req_1")).await.unwrap();
        assert!(record.webhook_secret_hash.is_none());
    }

    #[tokio::test]
    async fn duplicate_request_id_is_rejected() {
        let store = store_with_record("req_1").await;
        let err = store
            .create_record(&request_id("req_1"), &agent_id("a2"), "https://other.test", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn status_flows_to_completed() {
        let store = store_with_record("req_1").await;
        let id = request_id("req_1");

        store.mark_delivering(&id).await.unwrap();
        assert_eq!(
            store.get_record(&id).await.unwrap().status,
            DeliveryStatus::Delivering
        );

        store.mark_completed(&id).await.unwrap();
        let record = store.get_record(&id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn terminal_status_is_immutable() {
        let store = store_with_record("req_1").await;
        let id = request_id("req_1");

        store.mark_completed(&id).await.unwrap();
        store.mark_failed(&id).await.unwrap();
        assert_eq!(
            store.get_record(&id).await.unwrap().status,
            DeliveryStatus::Completed
        );

        store.update_seq(&id, 9, "late.event").await.unwrap();
        assert_eq!(store.get_record(&id).await.unwrap().seq, 0);
    }

    #[tokio::test]
    async fn seq_never_decreases() {
        let store = store_with_record("req_1").await;
        let id = request_id("req_1");

        store.update_seq(&id, 3, "message.part.updated").await.unwrap();
        store.update_seq(&id, 2, "message.part.updated").await.unwrap();

        let record = store.get_record(&id).await.unwrap();
        assert_eq!(record.seq, 3);
        assert_eq!(
            record.last_event_type.as_deref(),
            Some("message.part.updated")
        );
    }

    #[tokio::test]
    async fn record_attempt_accumulates() {
        let store = store_with_record("req_1").await;
        let id = request_id("req_1");

        store
            .record_attempt(
                &id,
                &DeliveryAttempt {
                    error: Some("500 from consumer".to_string()),
                    consecutive_failures: 1,
                    circuit_open_until: None,
                },
            )
            .await
            .unwrap();
        store
            .record_attempt(
                &id,
                &DeliveryAttempt {
                    error: None,
                    consecutive_failures: 0,
                    circuit_open_until: None,
                },
            )
            .await
            .unwrap();

        let record = store.get_record(&id).await.unwrap();
        assert_eq!(record.attempt_count, 2);
        assert!(record.last_error.is_none());
        assert!(record.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn list_for_agent_filters() {
        let store = MemoryDeliveryStore::new();
        store
            .create_record(&request_id("req_1"), &agent_id("a1"), "https://c.test/h", None)
            .await
            .unwrap();
        store
            .create_record(&request_id("req_2"), &agent_id("a1"), "https://c.test/h", None)
            .await
            .unwrap();
        store
            .create_record(&request_id("req_3"), &agent_id("a2"), "https://c.test/h", None)
            .await
            .unwrap();

        let records = store.list_for_agent(&agent_id("a1")).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.agent_id == "a1"));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = MemoryDeliveryStore::new();
        assert!(matches!(
            store.get_record(&request_id("req_x")).await,
            Err(StoreError::NotFound)
        ));
    }
}
