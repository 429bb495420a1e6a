use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often an idle worker polls for newly-queued items.
    #[serde(default = "d_poll_secs")]
    pub poll_interval_secs: u64,
    /// A claimed item whose heartbeat is older than this is considered
    /// abandoned and reclaimed back to `queued`.
    #[serde(default = "d_stale_secs")]
    pub stale_threshold_secs: u64,
    /// Lookback window for backfilling missed cron fires on startup.
    #[serde(default = "d_backfill_hours")]
    pub backfill_window_hours: u64,
    /// Maximum number of runs a single schedule may have in flight at once.
    #[serde(default = "d_max_concurrency")]
    pub max_concurrency: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: d_poll_secs(),
            stale_threshold_secs: d_stale_secs(),
            backfill_window_hours: d_backfill_hours(),
            max_concurrency: d_max_concurrency(),
        }
    }
}

impl QueueConfig {
    /// Lease duration for a job with the given timeout, per the
    /// formula shared by both SQL dialects: double the timeout,
    /// floored at 5 minutes, capped at 6 hours.
    pub fn lease_secs(&self, timeout_secs: u64) -> u64 {
        (timeout_secs.saturating_mul(2)).clamp(300, 21_600)
    }

    /// Heartbeat cadence for a lease of the given length: half the
    /// lease, capped at 60s so a long lease still gets timely renewal.
    pub fn heartbeat_interval_secs(&self, lease_secs: u64) -> u64 {
        (lease_secs / 2).min(60).max(1)
    }

    /// Exponential retry backoff for the given 1-indexed attempt
    /// number, capped at 1 hour.
    pub fn retry_delay_secs(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(10);
        (60u64.saturating_mul(1u64 << exp)).min(3600)
    }
}

fn d_poll_secs() -> u64 {
    5
}
fn d_stale_secs() -> u64 {
    120
}
fn d_backfill_hours() -> u64 {
    2
}
fn d_max_concurrency() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_secs_floors_at_five_minutes() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.lease_secs(10), 300);
    }

    #[test]
    fn lease_secs_doubles_timeout_within_range() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.lease_secs(1000), 2000);
    }

    #[test]
    fn lease_secs_caps_at_six_hours() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.lease_secs(100_000), 21_600);
    }

    #[test]
    fn heartbeat_interval_is_half_lease_capped_at_sixty() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs(300), 60);
        assert_eq!(cfg.heartbeat_interval_secs(40), 20);
    }

    #[test]
    fn retry_delay_doubles_then_caps() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.retry_delay_secs(1), 60);
        assert_eq!(cfg.retry_delay_secs(2), 120);
        assert_eq!(cfg.retry_delay_secs(3), 240);
        assert_eq!(cfg.retry_delay_secs(20), 3600);
    }
}
