//! Embedded schema for the delivery store.

/// DDL for the `webhook_deliveries` table.
///
/// Idempotent; executed by [`crate::PgDeliveryStore::run_migrations`].
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS webhook_deliveries (
    id                   BIGSERIAL PRIMARY KEY,
    request_id           TEXT NOT NULL,
    agent_id             TEXT NOT NULL,
    webhook_url          TEXT NOT NULL,
    webhook_secret_hash  TEXT,
    seq                  BIGINT NOT NULL DEFAULT 0,
    last_event_type      TEXT,
    status               TEXT NOT NULL DEFAULT 'pending',
    attempt_count        INTEGER NOT NULL DEFAULT 0,
    last_attempt_at      TIMESTAMPTZ,
    last_error           TEXT,
    next_retry_at        TIMESTAMPTZ,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    circuit_open_until   TIMESTAMPTZ,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at         TIMESTAMPTZ
);

CREATE UNIQUE INDEX IF NOT EXISTS webhook_deliveries_request_id_key
    ON webhook_deliveries (request_id);

CREATE INDEX IF NOT EXISTS webhook_deliveries_agent_id_idx
    ON webhook_deliveries (agent_id);
";
