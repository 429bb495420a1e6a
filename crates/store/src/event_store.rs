//! Durable append-only run event log.
//!
//! `append` runs in a short-lived transaction: claim the next
//! `run_id`-scoped id by incrementing `runs.next_event_id`, insert the
//! event, commit. Only after the commit succeeds does the event get
//! fanned out to in-process subscribers — a subscriber must never be
//! able to observe an event that a concurrent crash could still roll
//! back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use foreman_domain::entities::RunEvent;
use foreman_domain::{Error, Result};

use crate::pool::Pool;
use crate::rows::RunEventRow;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventStore {
    pool: Pool,
    channels: Arc<Mutex<HashMap<i64, broadcast::Sender<RunEvent>>>>,
}

impl EventStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn channel_for(&self, run_id: i64) -> broadcast::Sender<RunEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to live events for a run. Does not replay history —
    /// callers needing replay-then-tail should call `get_after` first
    /// and subscribe before or during that read to avoid a gap; the
    /// Stream Assembler is responsible for the dedup-by-id needed to
    /// stitch the two together safely.
    pub fn subscribe(&self, run_id: i64) -> broadcast::Receiver<RunEvent> {
        self.channel_for(run_id).subscribe()
    }

    pub async fn append(&self, run_id: i64, event_type: &str, payload: Value) -> Result<RunEvent> {
        let event = match &self.pool {
            Pool::Sqlite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| Error::Store(format!("begin tx: {e}")))?;

                let next_id: i64 = sqlx::query_scalar(
                    "UPDATE runs SET next_event_id = next_event_id + 1 WHERE id = ?1 \
                     RETURNING next_event_id - 1",
                )
                .bind(run_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::Store(format!("claim event id: {e}")))?;

                let row: RunEventRow = sqlx::query_as(
                    "INSERT INTO run_events (id, run_id, event_type, payload, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     RETURNING id, run_id, event_type, payload, created_at",
                )
                .bind(next_id)
                .bind(run_id)
                .bind(event_type)
                .bind(&payload)
                .bind(chrono::Utc::now())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::Store(format!("insert run_event: {e}")))?;

                tx.commit()
                    .await
                    .map_err(|e| Error::Store(format!("commit tx: {e}")))?;

                row.into_entity()
            }
            Pool::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| Error::Store(format!("begin tx: {e}")))?;

                let next_id: i64 = sqlx::query_scalar(
                    "UPDATE runs SET next_event_id = next_event_id + 1 WHERE id = $1 \
                     RETURNING next_event_id - 1",
                )
                .bind(run_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::Store(format!("claim event id: {e}")))?;

                let row: RunEventRow = sqlx::query_as(
                    "INSERT INTO run_events (id, run_id, event_type, payload, created_at) \
                     VALUES ($1, $2, $3, $4, $5) \
                     RETURNING id, run_id, event_type, payload, created_at",
                )
                .bind(next_id)
                .bind(run_id)
                .bind(event_type)
                .bind(&payload)
                .bind(chrono::Utc::now())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::Store(format!("insert run_event: {e}")))?;

                tx.commit()
                    .await
                    .map_err(|e| Error::Store(format!("commit tx: {e}")))?;

                row.into_entity()
            }
        };

        // Best-effort: a send with no subscribers is not an error.
        let _ = self.channel_for(run_id).send(event.clone());
        Ok(event)
    }

    /// Replay events with id strictly greater than `after_id`, in
    /// ascending order. `after_id = 0` replays the whole log.
    pub async fn get_after(&self, run_id: i64, after_id: i64) -> Result<Vec<RunEvent>> {
        let rows: Vec<RunEventRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, run_id, event_type, payload, created_at FROM run_events \
                 WHERE run_id = ?1 AND id > ?2 ORDER BY id ASC",
            )
            .bind(run_id)
            .bind(after_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("get_after: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, run_id, event_type, payload, created_at FROM run_events \
                 WHERE run_id = $1 AND id > $2 ORDER BY id ASC",
            )
            .bind(run_id)
            .bind(after_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("get_after: {e}")))?,
        };

        Ok(rows.into_iter().map(RunEventRow::into_entity).collect())
    }

    /// Drop the in-process broadcast channel for a finished run, so it
    /// doesn't linger in the map forever. Safe to call even if
    /// subscribers are still attached — they keep their own receiver.
    pub fn forget(&self, run_id: i64) {
        self.channels.lock().remove(&run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        serde_json::json!({"token": "hello"})
    }

    #[test]
    fn channel_for_is_stable_across_calls() {
        let store = EventStore::new_for_test();
        let tx1 = store.channel_for(1);
        let tx2 = store.channel_for(1);
        assert_eq!(tx1.receiver_count(), tx2.receiver_count());
    }

    #[test]
    fn forget_drops_channel_entry() {
        let store = EventStore::new_for_test();
        let _rx = store.subscribe(42);
        assert!(store.channels.lock().contains_key(&42));
        store.forget(42);
        assert!(!store.channels.lock().contains_key(&42));
    }

    impl EventStore {
        /// Construct an `EventStore` with no real pool, for tests that
        /// only exercise the in-process broadcast bookkeeping.
        fn new_for_test() -> Self {
            Self {
                pool: Pool::Sqlite(sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap()),
                channels: Arc::new(Mutex::new(HashMap::new())),
            }
        }
    }

    #[test]
    fn sample_payload_is_object() {
        assert!(sample_payload().is_object());
    }
}
