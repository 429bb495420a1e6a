use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::capability::Capability;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single supervisor execution over a thread.
///
/// A run cycles between `Running` and `Waiting` as it suspends on
/// `spawn_worker` calls and resumes when the worker job completes —
/// there is no in-memory coroutine kept alive across a suspension, the
/// thread's message history plus this row is everything needed to
/// re-enter the ReAct loop after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub thread_id: i64,
    pub owner_id: String,
    pub status: RunStatus,
    pub step_count: u32,
    /// Set while `status == Waiting`; the worker job this run is
    /// blocked on. Cleared on resume.
    pub waiting_on_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Waiting,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed | RunStatus::Cancelled)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread / ThreadMessage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A conversation. Owns the durable message history a run replays
/// into context on every step and resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub owner_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once compaction has collapsed messages older than this id
    /// into a summary message; compaction never re-summarizes past it.
    pub compacted_through_message_id: Option<i64>,
}

/// One message in a thread's durable history.
///
/// Distinct from `RunEvent`: a `ThreadMessage` is the compacted,
/// replay-ready conversation state an LLM call is built from; a
/// `RunEvent` is the raw append-only log of everything that happened
/// during a run, including events (like token streaming) that never
/// become part of the durable message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: i64,
    pub thread_id: i64,
    pub run_id: Option<i64>,
    pub role: MessageRole,
    pub content: Value,
    /// Present on tool-call messages produced by a worker dispatch;
    /// lets evidence mounting find the originating job without a
    /// round trip through the event log.
    pub worker_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
    /// A compaction-generated summary standing in for older messages.
    Summary,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WorkerJob
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A unit of work delegated from a run to a specific runner, via
/// `spawn_worker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerJob {
    pub id: i64,
    pub run_id: i64,
    pub owner_id: String,
    pub runner_id: String,
    pub command: String,
    pub status: WorkerJobStatus,
    pub timeout_secs: u32,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Set when the worker reported `job.error { critical: true }` —
    /// short-circuits the dispatcher's timeout wait instead of
    /// blocking until `timeout_secs` elapses.
    pub critical_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerJobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Rejected,
}

impl WorkerJobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkerJobStatus::Queued | WorkerJobStatus::Running)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A user-owned remote executor registered over the runner transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: RunnerStatus,
    pub capabilities: Vec<Capability>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Online,
    Offline,
    Revoked,
}

/// A runner's device token — the shared secret presented in the
/// `hello` frame. The plaintext is shown to the owner exactly once at
/// creation time; only its salted hash is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub id: Uuid,
    pub runner_id: String,
    pub owner_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RunEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single append-only entry in a run's durable event log.
///
/// `id` is monotonically increasing within a run (not globally) and
/// is the cursor the Stream Assembler replays from. Events are never
/// mutated or deleted except by the explicit per-run purge used in
/// tests and by the (currently unused) event retention job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub id: i64,
    pub run_id: i64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// `stream_control` payload — a sentinel event type the Stream
/// Assembler uses to decide whether to hold a live connection open
/// after replay catches up, independent of the run's own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamControl {
    Close,
    KeepOpen,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QueueItem
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A scheduled or ad-hoc queued job awaiting a worker to claim it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub job_name: String,
    pub payload: Value,
    pub status: QueueItemStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub lease_secs: u32,
    /// The error from the most recent failed attempt. Retained through
    /// retries and into the terminal `dead_lettered` state so an
    /// operator inspecting a dead job doesn't need the worker's log.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    DeadLettered,
}

/// How a cron-scheduled job should handle fire times missed while the
/// queue worker was down, generalizing the teacher's own
/// `schedule_runner` semantics into a per-job config knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    /// Drop missed fires; only run on the next natural tick.
    Skip,
    /// Enqueue a single catch-up run for the most recent missed fire.
    #[default]
    RunOnce,
    /// Enqueue one run per missed fire within the backfill window.
    CatchUp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminal_classification() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Waiting.is_terminal());
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn worker_job_status_terminal_classification() {
        assert!(!WorkerJobStatus::Queued.is_terminal());
        assert!(!WorkerJobStatus::Running.is_terminal());
        assert!(WorkerJobStatus::Succeeded.is_terminal());
        assert!(WorkerJobStatus::Rejected.is_terminal());
    }

    #[test]
    fn missed_policy_default_is_run_once() {
        assert_eq!(MissedPolicy::default(), MissedPolicy::RunOnce);
    }
}
