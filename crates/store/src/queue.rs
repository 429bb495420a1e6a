//! Durable claim–heartbeat queue storage.
//!
//! Claim semantics differ per dialect (`FOR UPDATE SKIP LOCKED` on
//! Postgres, a single `UPDATE ... RETURNING` relying on SQLite's
//! statement-level write lock) but converge on the same effect: pick
//! the oldest due `queued` row, atomically flip it to `running` under
//! this worker's ownership, and hand it back. Retry/backfill/reclaim
//! policy itself lives in `foreman-queue`; this module is just the
//! storage primitives it composes.

use chrono::{DateTime, Utc};
use serde_json::Value;

use foreman_domain::entities::{QueueItem, QueueItemStatus};
use foreman_domain::{Error, Result};

use crate::pool::Pool;
use crate::rows::{status_str, QueueItemRow};

#[derive(Clone)]
pub struct QueueStore {
    pool: Pool,
}

const QUEUE_ITEM_COLUMNS: &str = "id, job_name, payload, status, scheduled_for, created_at, \
     claimed_at, heartbeat_at, worker_id, attempts, max_attempts, lease_secs, last_error";

impl QueueStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert a new item. Returns `None` without inserting when a row
    /// with the same `(job_name, scheduled_for)` already exists — the
    /// backfill dedupe key (I5): concurrent backfill attempts from two
    /// racing startups produce at most one enqueued fire.
    pub async fn enqueue(
        &self,
        job_name: &str,
        payload: Value,
        scheduled_for: Option<DateTime<Utc>>,
        max_attempts: u32,
        lease_secs: u32,
    ) -> Result<Option<QueueItem>> {
        let now = Utc::now();
        let status = status_str(&QueueItemStatus::Queued)?;
        let row: Option<QueueItemRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(&format!(
                "INSERT OR IGNORE INTO queue_items \
                 (job_name, payload, status, scheduled_for, created_at, attempts, max_attempts, lease_secs) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7) \
                 RETURNING {QUEUE_ITEM_COLUMNS}",
            ))
            .bind(job_name)
            .bind(&payload)
            .bind(&status)
            .bind(scheduled_for)
            .bind(now)
            .bind(max_attempts as i64)
            .bind(lease_secs as i64)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("enqueue: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(&format!(
                "INSERT INTO queue_items \
                 (job_name, payload, status, scheduled_for, created_at, attempts, max_attempts, lease_secs) \
                 VALUES ($1, $2, $3, $4, $5, 0, $6, $7) \
                 ON CONFLICT (job_name, scheduled_for) DO NOTHING \
                 RETURNING {QUEUE_ITEM_COLUMNS}",
            ))
            .bind(job_name)
            .bind(&payload)
            .bind(&status)
            .bind(scheduled_for)
            .bind(now)
            .bind(max_attempts as i64)
            .bind(lease_secs as i64)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("enqueue: {e}")))?,
        };
        row.map(QueueItemRow::into_entity).transpose()
    }

    pub async fn get(&self, item_id: i64) -> Result<Option<QueueItem>> {
        let row: Option<QueueItemRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(&format!(
                "SELECT {QUEUE_ITEM_COLUMNS} FROM queue_items WHERE id = ?1"
            ))
            .bind(item_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(&format!(
                "SELECT {QUEUE_ITEM_COLUMNS} FROM queue_items WHERE id = $1"
            ))
            .bind(item_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get: {e}")))?,
        };
        row.map(QueueItemRow::into_entity).transpose()
    }

    /// Claim the oldest due `queued` row for `worker_id`, or `None` if
    /// nothing is claimable right now.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<QueueItem>> {
        let queued = status_str(&QueueItemStatus::Queued)?;
        let running = status_str(&QueueItemStatus::Running)?;
        let now = Utc::now();
        let row: Option<QueueItemRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(&format!(
                "UPDATE queue_items SET status = ?1, worker_id = ?2, claimed_at = ?3, \
                 heartbeat_at = ?3, attempts = attempts + 1 \
                 WHERE id = ( \
                     SELECT id FROM queue_items \
                     WHERE status = ?4 AND (scheduled_for IS NULL OR scheduled_for <= ?3) \
                     ORDER BY created_at, id LIMIT 1 \
                 ) \
                 RETURNING {QUEUE_ITEM_COLUMNS}",
            ))
            .bind(&running)
            .bind(worker_id)
            .bind(now)
            .bind(&queued)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("claim: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(&format!(
                "UPDATE queue_items SET status = $1, worker_id = $2, claimed_at = $3, \
                 heartbeat_at = $3, attempts = attempts + 1 \
                 WHERE id = ( \
                     SELECT id FROM queue_items \
                     WHERE status = $4 AND (scheduled_for IS NULL OR scheduled_for <= $3) \
                     ORDER BY created_at, id LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING {QUEUE_ITEM_COLUMNS}",
            ))
            .bind(&running)
            .bind(worker_id)
            .bind(now)
            .bind(&queued)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("claim: {e}")))?,
        };
        row.map(QueueItemRow::into_entity).transpose()
    }

    /// Extend a running claim's lease. Only succeeds while the row is
    /// still `running` and still owned by `worker_id` — a worker that
    /// lost its job (reclaimed out from under it) gets `false` back and
    /// must abort rather than keep working on a job someone else now
    /// owns.
    pub async fn heartbeat(&self, item_id: i64, worker_id: &str) -> Result<bool> {
        let running = status_str(&QueueItemStatus::Running)?;
        let rows_affected = match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET heartbeat_at = ?1 \
                     WHERE id = ?2 AND status = ?3 AND worker_id = ?4",
                )
                .bind(Utc::now())
                .bind(item_id)
                .bind(&running)
                .bind(worker_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET heartbeat_at = $1 \
                     WHERE id = $2 AND status = $3 AND worker_id = $4",
                )
                .bind(Utc::now())
                .bind(item_id)
                .bind(&running)
                .bind(worker_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("heartbeat: {e}")))?
        .rows_affected();
        Ok(rows_affected == 1)
    }

    pub async fn mark_succeeded(&self, item_id: i64) -> Result<()> {
        let status = status_str(&QueueItemStatus::Succeeded)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE queue_items SET status = ?1, last_error = NULL WHERE id = ?2")
                    .bind(&status)
                    .bind(item_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE queue_items SET status = $1, last_error = NULL WHERE id = $2")
                    .bind(&status)
                    .bind(item_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("mark_succeeded: {e}")))?;
        Ok(())
    }

    /// Requeue a failed item for a later retry, clearing its claim.
    pub async fn requeue_with_delay(
        &self,
        item_id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let status = status_str(&QueueItemStatus::Queued)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET status = ?1, scheduled_for = ?2, last_error = ?3, \
                     worker_id = NULL, claimed_at = NULL, heartbeat_at = NULL WHERE id = ?4",
                )
                .bind(&status)
                .bind(retry_at)
                .bind(error)
                .bind(item_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET status = $1, scheduled_for = $2, last_error = $3, \
                     worker_id = NULL, claimed_at = NULL, heartbeat_at = NULL WHERE id = $4",
                )
                .bind(&status)
                .bind(retry_at)
                .bind(error)
                .bind(item_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("requeue_with_delay: {e}")))?;
        Ok(())
    }

    pub async fn dead_letter(&self, item_id: i64, error: &str) -> Result<()> {
        let status = status_str(&QueueItemStatus::DeadLettered)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE queue_items SET status = ?1, last_error = ?2 WHERE id = ?3")
                    .bind(&status)
                    .bind(error)
                    .bind(item_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE queue_items SET status = $1, last_error = $2 WHERE id = $3")
                    .bind(&status)
                    .bind(error)
                    .bind(item_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("dead_letter: {e}")))?;
        Ok(())
    }

    /// Promote rows stuck `running` with a stale or missing heartbeat
    /// back to `queued`, clearing ownership. Returns how many were
    /// reclaimed. A live worker's heartbeat always pre-empts this —
    /// the `WHERE` clause only matches rows that have gone quiet.
    pub async fn reclaim_stale(&self, stale_threshold_secs: i64) -> Result<u64> {
        let running = status_str(&QueueItemStatus::Running)?;
        let queued = status_str(&QueueItemStatus::Queued)?;
        let cutoff = Utc::now() - chrono::Duration::seconds(stale_threshold_secs);
        let rows_affected = match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET status = ?1, worker_id = NULL, claimed_at = NULL, heartbeat_at = NULL \
                     WHERE status = ?2 AND (heartbeat_at IS NULL OR heartbeat_at < ?3)",
                )
                .bind(&queued)
                .bind(&running)
                .bind(cutoff)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE queue_items SET status = $1, worker_id = NULL, claimed_at = NULL, heartbeat_at = NULL \
                     WHERE status = $2 AND (heartbeat_at IS NULL OR heartbeat_at < $3)",
                )
                .bind(&queued)
                .bind(&running)
                .bind(cutoff)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("reclaim_stale: {e}")))?
        .rows_affected();
        Ok(rows_affected)
    }

    /// Most recent `scheduled_for` already recorded for a job name,
    /// used by backfill to avoid recomputing fires already enqueued in
    /// a prior process lifetime.
    pub async fn latest_scheduled_for(&self, job_name: &str) -> Result<Option<DateTime<Utc>>> {
        match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_scalar(
                "SELECT MAX(scheduled_for) FROM queue_items WHERE job_name = ?1",
            )
            .bind(job_name)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("latest_scheduled_for: {e}"))),
            Pool::Postgres(pool) => sqlx::query_scalar(
                "SELECT MAX(scheduled_for) FROM queue_items WHERE job_name = $1",
            )
            .bind(job_name)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("latest_scheduled_for: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_item_status_serializes_to_plain_snake_case_string() {
        assert_eq!(status_str(&QueueItemStatus::DeadLettered).unwrap(), "dead_lettered");
        assert_eq!(status_str(&QueueItemStatus::Queued).unwrap(), "queued");
    }
}
