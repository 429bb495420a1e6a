//! Job dispatch: push a `job.request` frame to a runner and await its
//! matching `job.result`/`job.error`, keyed by `job_id`.
//!
//! Mirrors the gateway's own tool router: a pending-request map guarded
//! by `parking_lot::Mutex` (never held across an await), a one-shot
//! channel per in-flight call, and an explicit fail-all sweep on
//! connection loss so a dropped connection doesn't leave a waiter
//! hanging forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::frame::RunnerFrame;
use crate::manager::{ConnectionKey, ConnectionManager};

/// Grace period added on top of a job's own timeout before the
/// dispatcher gives up waiting for a result — the runner is expected
/// to enforce `timeout_secs` itself and report back; this only guards
/// against a runner that never answers at all.
const TIMEOUT_GRACE_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobOutcome {
    Success {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },
    Error {
        message: String,
        critical: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("runner offline")]
    Offline,
    #[error("connection lost")]
    ConnectionLost,
    #[error("timed out")]
    TimedOut,
}

struct Pending {
    key: ConnectionKey,
    tx: oneshot::Sender<JobOutcome>,
}

/// Tracks in-flight `job.request` dispatches awaiting a result.
pub struct PendingDispatch {
    pending: Mutex<HashMap<i64, Pending>>,
}

impl Default for PendingDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingDispatch {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Push a `job.request` to the runner at `key` and wait for its
    /// terminal result, bounded by `timeout_secs + grace`. Convenience
    /// wrapper over `begin` + `await_result` for callers that don't
    /// need to observe the in-between "sent" moment.
    pub async fn dispatch(
        &self,
        connections: &ConnectionManager,
        key: ConnectionKey,
        job_id: i64,
        command: String,
        timeout_secs: u32,
    ) -> Result<JobOutcome, DispatchError> {
        let rx = self.begin(connections, key, job_id, command, timeout_secs).await?;
        Self::await_result(rx, job_id, &self.pending, timeout_secs).await
    }

    /// Phase one: register the waiter and push the frame. Returns the
    /// receiver so the caller can record a "dispatched" lifecycle event
    /// before blocking on the job's actual completion.
    pub async fn begin(
        &self,
        connections: &ConnectionManager,
        key: ConnectionKey,
        job_id: i64,
        command: String,
        timeout_secs: u32,
    ) -> Result<oneshot::Receiver<JobOutcome>, DispatchError> {
        let sink = connections.sink(&key).ok_or(DispatchError::Offline)?;

        let (tx, rx) = oneshot::channel();
        let prev = self.pending.lock().insert(job_id, Pending { key, tx });
        debug_assert!(prev.is_none(), "job_id collision: {job_id}");

        let frame = RunnerFrame::JobRequest {
            job_id,
            command,
            timeout_secs,
        };
        if sink.send(frame).await.is_err() {
            self.pending.lock().remove(&job_id);
            return Err(DispatchError::Offline);
        }
        Ok(rx)
    }

    /// Phase two: wait for the receiver `begin` returned.
    pub async fn await_result(
        rx: oneshot::Receiver<JobOutcome>,
        job_id: i64,
        pending: &Mutex<HashMap<i64, Pending>>,
        timeout_secs: u32,
    ) -> Result<JobOutcome, DispatchError> {
        let wait = Duration::from_secs(timeout_secs as u64 + TIMEOUT_GRACE_SECS);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(DispatchError::ConnectionLost),
            Err(_) => {
                pending.lock().remove(&job_id);
                Err(DispatchError::TimedOut)
            }
        }
    }

    /// Called when a `job.result` or `job.error` frame arrives.
    /// Returns `true` if a waiter was found and completed.
    pub fn complete(&self, job_id: i64, outcome: JobOutcome) -> bool {
        if let Some(pending) = self.pending.lock().remove(&job_id) {
            let _ = pending.tx.send(outcome);
            true
        } else {
            tracing::warn!(job_id, "received job result for unknown or already-resolved job");
            false
        }
    }

    /// Fail every pending dispatch routed through `key`. Called when
    /// its connection drops — a reader-loop exit or an explicit
    /// displacement on reconnect.
    pub fn fail_all_for_connection(&self, key: &ConnectionKey) -> usize {
        let mut pending = self.pending.lock();
        let stale: Vec<i64> = pending
            .iter()
            .filter(|(_, p)| &p.key == key)
            .map(|(job_id, _)| *job_id)
            .collect();
        let count = stale.len();
        for job_id in stale {
            if let Some(p) = pending.remove(&job_id) {
                let _ = p.tx.send(JobOutcome::Error {
                    message: "connection lost".into(),
                    critical: false,
                });
            }
        }
        count
    }
}

/// Convenience entry point bundling the connection manager and the
/// pending-dispatch tracker — what the Worker Dispatcher actually
/// holds a handle to.
#[derive(Clone)]
pub struct Dispatch {
    connections: Arc<ConnectionManager>,
    pending: Arc<PendingDispatch>,
}

impl Dispatch {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            connections,
            pending: Arc::new(PendingDispatch::new()),
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub async fn dispatch(
        &self,
        key: ConnectionKey,
        job_id: i64,
        command: String,
        timeout_secs: u32,
    ) -> Result<JobOutcome, DispatchError> {
        self.pending
            .dispatch(&self.connections, key, job_id, command, timeout_secs)
            .await
    }

    /// Phase one of a dispatch: send the frame, return a receiver the
    /// caller awaits separately with `wait`. Lets the Worker Dispatcher
    /// emit its `worker_started` event between the send and the wait.
    pub async fn begin(
        &self,
        key: ConnectionKey,
        job_id: i64,
        command: String,
        timeout_secs: u32,
    ) -> Result<oneshot::Receiver<JobOutcome>, DispatchError> {
        self.pending.begin(&self.connections, key, job_id, command, timeout_secs).await
    }

    pub async fn wait(
        &self,
        rx: oneshot::Receiver<JobOutcome>,
        job_id: i64,
        timeout_secs: u32,
    ) -> Result<JobOutcome, DispatchError> {
        PendingDispatch::await_result(rx, job_id, &self.pending.pending, timeout_secs).await
    }

    pub fn complete(&self, job_id: i64, outcome: JobOutcome) -> bool {
        self.pending.complete(job_id, outcome)
    }

    pub fn fail_all_for_connection(&self, key: &ConnectionKey) -> usize {
        self.pending.fail_all_for_connection(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_on_unknown_job_id_returns_false() {
        let pending = PendingDispatch::new();
        assert!(!pending.complete(999, JobOutcome::Error { message: "x".into(), critical: false }));
    }

    #[tokio::test]
    async fn dispatch_without_connection_fails_offline() {
        let connections = ConnectionManager::new();
        let pending = PendingDispatch::new();
        let key = ConnectionKey {
            owner_id: "owner-1".into(),
            runner_id: "runner-1".into(),
        };
        let err = pending
            .dispatch(&connections, key, 1, "uptime".into(), 30)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Offline));
    }

    #[test]
    fn fail_all_for_connection_only_touches_matching_key() {
        let pending = PendingDispatch::new();
        let key_a = ConnectionKey { owner_id: "a".into(), runner_id: "r".into() };
        let key_b = ConnectionKey { owner_id: "b".into(), runner_id: "r".into() };
        let (tx_a, _rx_a) = oneshot::channel();
        let (tx_b, _rx_b) = oneshot::channel();
        pending.pending.lock().insert(1, Pending { key: key_a.clone(), tx: tx_a });
        pending.pending.lock().insert(2, Pending { key: key_b, tx: tx_b });

        let failed = pending.fail_all_for_connection(&key_a);
        assert_eq!(failed, 1);
        assert!(!pending.pending.lock().contains_key(&1));
        assert!(pending.pending.lock().contains_key(&2));
    }
}
