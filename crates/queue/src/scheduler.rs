//! Ties the cron evaluator and missed-window policy to `QueueStore`,
//! turning a static list of recurring job definitions into durable
//! `queue_items`. The same sweep logic serves both the one-time
//! startup backfill and the ongoing per-tick enqueue of each job's
//! next natural fire — a tick is just a backfill bounded to "now".

use chrono::{DateTime, Utc};
use serde_json::Value;

use foreman_domain::config::QueueConfig;
use foreman_domain::entities::MissedPolicy;
use foreman_domain::Result;
use foreman_store::QueueStore;

use crate::backfill::fires_to_enqueue;
use crate::cron::parse_tz;

/// A safety bound on how many individual fires a single sweep call
/// will enumerate for one job, independent of the backfill window —
/// guards against a pathological cron expression firing every second
/// over a multi-hour window.
const MAX_FIRES_PER_SWEEP: usize = 10_000;

/// A recurring job definition. Distinct from a one-off `QueueItem`:
/// this never itself becomes a row — it's the template the scheduler
/// uses to decide which rows to create and when.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    pub name: String,
    pub cron_expr: String,
    pub timezone: String,
    pub missed_policy: MissedPolicy,
    pub max_attempts: u32,
    pub timeout_secs: u32,
    pub payload: Value,
}

#[derive(Clone)]
pub struct Scheduler {
    store: QueueStore,
    config: QueueConfig,
    schedules: Vec<JobSchedule>,
}

impl Scheduler {
    pub fn new(store: QueueStore, config: QueueConfig, schedules: Vec<JobSchedule>) -> Self {
        Self { store, config, schedules }
    }

    /// Run once at process startup, after the zombie sweep (so stale
    /// `running` rows from a previous process don't shadow the
    /// backfill decision about what's already been enqueued).
    pub async fn backfill(&self) -> Result<usize> {
        self.sweep(Utc::now()).await
    }

    /// Run periodically thereafter to enqueue each job's next natural
    /// fire as it comes due. Idempotent: the `(job_name, scheduled_for)`
    /// dedupe key means a fire already enqueued by a previous tick (or
    /// by backfill, or by a racing restart) is silently skipped.
    pub async fn tick(&self) -> Result<usize> {
        self.sweep(Utc::now()).await
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let window_start = now - chrono::Duration::hours(self.config.backfill_window_hours as i64);
        let mut enqueued = 0;
        for job in &self.schedules {
            let tz = parse_tz(&job.timezone);
            let latest = self.store.latest_scheduled_for(&job.name).await?;
            let anchor = latest.map(|t| t.max(window_start)).unwrap_or(window_start);

            let fires = fires_to_enqueue(
                job.missed_policy,
                &job.cron_expr,
                tz,
                Some(anchor),
                &now,
                MAX_FIRES_PER_SWEEP,
            );
            if fires.is_empty() {
                continue;
            }
            let lease_secs = self.config.lease_secs(job.timeout_secs as u64) as u32;
            for fire in &fires {
                match self
                    .store
                    .enqueue(&job.name, job.payload.clone(), Some(*fire), job.max_attempts, lease_secs)
                    .await?
                {
                    Some(_) => enqueued += 1,
                    None => {
                        tracing::debug!(job = %job.name, fire = %fire, "fire already enqueued, dedupe key hit");
                    }
                }
            }
        }
        Ok(enqueued)
    }

    /// Drive `tick` forever at `config.poll_interval_secs` cadence
    /// until `cancel` fires.
    pub async fn run_forever(self: std::sync::Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval_secs));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(policy: MissedPolicy) -> JobSchedule {
        JobSchedule {
            name: "nightly".into(),
            cron_expr: "0 * * * *".into(),
            timezone: "UTC".into(),
            missed_policy: policy,
            max_attempts: 3,
            timeout_secs: 60,
            payload: Value::Null,
        }
    }

    #[test]
    fn job_schedule_is_cloneable_for_reuse_across_ticks() {
        let job = sample_job(MissedPolicy::RunOnce);
        let cloned = job.clone();
        assert_eq!(job.name, cloned.name);
    }
}
