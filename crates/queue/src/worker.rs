//! Claim–heartbeat–execute loop for durable queue items, plus the
//! reclaim sweeper that recovers rows abandoned by a crashed worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use foreman_domain::config::QueueConfig;
use foreman_domain::entities::QueueItem;
use foreman_store::QueueStore;

/// What a job handler does with one claimed item. Distinguishing
/// "normal failure" (retried with backoff, eventually dead-lettered)
/// from none is deliberately not modeled here — every handler failure
/// is recoverable-by-retry; a handler that hits an unrecoverable
/// setup problem should still return `Err` and let the dead-letter
/// path take over once attempts are exhausted, matching spec.md §7's
/// closed error taxonomy at the tool boundary rather than introducing
/// a second one here.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, item: &QueueItem) -> Result<(), String>;
}

pub struct QueueWorker {
    store: QueueStore,
    config: QueueConfig,
    worker_id: String,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl QueueWorker {
    pub fn new(store: QueueStore, config: QueueConfig, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            config,
            worker_id: worker_id.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, job_name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_name.into(), handler);
    }

    /// Claim loop: poll for the next due item, run it to completion on
    /// a detached task (so one slow job doesn't stall claiming the
    /// next one), repeat. Polls at `config.poll_interval_secs` when
    /// nothing is claimable.
    pub async fn run_forever(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.store.claim(&self.worker_id).await {
                Ok(Some(item)) => {
                    let this = Arc::clone(&self);
                    let child_cancel = cancel.clone();
                    tokio::spawn(async move { this.run_claimed(item, child_cancel).await });
                }
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "queue claim failed, backing off");
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
            }
        }
    }

    /// Periodic sweep promoting abandoned `running` rows back to
    /// `queued`. A live worker's own heartbeat always pre-empts this —
    /// the row only qualifies once its heartbeat has gone stale.
    pub async fn run_reclaim_sweep(self: Arc<Self>, cancel: CancellationToken) {
        let interval = Duration::from_secs((self.config.stale_threshold_secs / 2).max(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    match self.store.reclaim_stale(self.config.stale_threshold_secs as i64).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(reclaimed = n, "reclaimed stale queue items"),
                        Err(e) => tracing::error!(error = %e, "reclaim sweep failed"),
                    }
                }
            }
        }
    }

    async fn run_claimed(&self, item: QueueItem, cancel: CancellationToken) {
        let Some(handler) = self.handlers.get(&item.job_name).cloned() else {
            tracing::error!(job_name = %item.job_name, item_id = item.id, "no handler registered for job");
            if let Err(e) = self
                .store
                .dead_letter(item.id, &format!("no handler registered for job {}", item.job_name))
                .await
            {
                tracing::error!(item_id = item.id, error = %e, "failed to dead-letter unhandled item");
            }
            return;
        };

        let heartbeat_handle = self.spawn_heartbeat(item.id, item.lease_secs);

        let outcome = handler.run(&item).await;
        heartbeat_handle.abort();

        if cancel.is_cancelled() {
            // Shutting down: don't record an outcome that would mask
            // a genuine retry opportunity next process lifetime.
            return;
        }

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.mark_succeeded(item.id).await {
                    tracing::error!(item_id = item.id, error = %e, "failed to mark queue item succeeded");
                }
            }
            Err(message) => self.fail(&item, &message).await,
        }
    }

    async fn fail(&self, item: &QueueItem, message: &str) {
        if item.attempts >= item.max_attempts {
            if let Err(e) = self.store.dead_letter(item.id, message).await {
                tracing::error!(item_id = item.id, error = %e, "failed to dead-letter exhausted item");
            }
            return;
        }
        let delay = self.config.retry_delay_secs(item.attempts);
        let retry_at = Utc::now() + chrono::Duration::seconds(delay as i64);
        if let Err(e) = self.store.requeue_with_delay(item.id, message, retry_at).await {
            tracing::error!(item_id = item.id, error = %e, "failed to requeue item for retry");
        }
    }

    fn spawn_heartbeat(&self, item_id: i64, lease_secs: u32) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = self.worker_id.clone();
        let interval = Duration::from_secs(self.config.heartbeat_interval_secs(lease_secs as u64));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match store.heartbeat(item_id, &worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // Lost the job — reclaimed out from under us,
                        // or it already finished. Either way, stop.
                        tracing::warn!(item_id, "heartbeat rejected, lease lost");
                        return;
                    }
                    Err(e) => tracing::error!(item_id, error = %e, "heartbeat extension failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_domain::entities::QueueItemStatus;
    use serde_json::Value;

    fn sample_item(attempts: u32, max_attempts: u32) -> QueueItem {
        QueueItem {
            id: 1,
            job_name: "nightly".into(),
            payload: Value::Null,
            status: QueueItemStatus::Running,
            scheduled_for: None,
            created_at: Utc::now(),
            claimed_at: Some(Utc::now()),
            heartbeat_at: Some(Utc::now()),
            worker_id: Some("w1".into()),
            attempts,
            max_attempts,
            lease_secs: 300,
            last_error: None,
        }
    }

    #[test]
    fn sample_item_builder_is_consistent() {
        let item = sample_item(1, 3);
        assert_eq!(item.attempts, 1);
        assert_eq!(item.max_attempts, 3);
    }
}
