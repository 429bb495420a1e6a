//! The dispatcher itself: job lifecycle, summarisation, and the
//! at-most-one resume handoff back to the Supervisor Engine.

use std::sync::Arc;

use serde_json::json;

use foreman_domain::config::DispatcherConfig;
use foreman_domain::entities::{MessageRole, RunStatus, WorkerJobStatus};
use foreman_store::{EventStore, JobStore, RunStore, RunnerStore};
use foreman_transport::{Dispatch, DispatchError, JobOutcome};

use crate::validator::{validate_command, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("runner {0} not found")]
    RunnerNotFound(String),
    #[error("runner {0} is revoked")]
    RunnerRevoked(String),
    #[error("command rejected: {0}")]
    Rejected(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] foreman_domain::Error),
}

/// What happened to a `spawn_worker` call once it returns to the
/// caller. The caller (the Supervisor Engine) only needs to know the
/// run is now suspended — the terminal outcome arrives later, out of
/// band, via `ResumeHandle::resume`.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub job_id: i64,
}

/// Notified when a worker job reaches a terminal state and this
/// dispatcher has won the at-most-one-resume race for its run. Kept as
/// a trait rather than a direct dependency on `foreman-supervisor` so
/// the two crates don't form a cycle — the supervisor implements this
/// and hands itself to the dispatcher at construction.
#[async_trait::async_trait]
pub trait ResumeHandle: Send + Sync {
    async fn resume(&self, run_id: i64, job_id: i64);
}

/// Compresses a long worker result into a short summary. Failure is
/// never fatal — the dispatcher falls back to head-truncation.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, String>;
}

pub struct WorkerDispatcher {
    runs: RunStore,
    jobs: JobStore,
    runners: RunnerStore,
    events: EventStore,
    transport: Dispatch,
    config: DispatcherConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
    resumer: Arc<dyn ResumeHandle>,
}

impl WorkerDispatcher {
    pub fn new(
        runs: RunStore,
        jobs: JobStore,
        runners: RunnerStore,
        events: EventStore,
        transport: Dispatch,
        config: DispatcherConfig,
        resumer: Arc<dyn ResumeHandle>,
    ) -> Self {
        Self {
            runs,
            jobs,
            runners,
            events,
            transport,
            config,
            summarizer: None,
            resumer,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// `spawnWorker(run, tool_call_id, command, runner_id, timeout) ->
    /// WorkerResult`. Validates, persists, suspends the run, and
    /// returns as soon as the run is marked `Waiting` — the actual
    /// dispatch-and-await happens on a detached task.
    pub async fn spawn_worker(
        self: &Arc<Self>,
        run_id: i64,
        owner_id: &str,
        tool_call_id: &str,
        runner_id: &str,
        command: &str,
        timeout_secs: Option<u32>,
    ) -> Result<DispatchOutcome, DispatcherError> {
        let runner = self
            .runners
            .get(runner_id)
            .await?
            .ok_or_else(|| DispatcherError::RunnerNotFound(runner_id.to_string()))?;
        if runner.revoked_at.is_some() {
            return Err(DispatcherError::RunnerRevoked(runner_id.to_string()));
        }

        validate_command(command, &runner.capabilities)?;

        let timeout_secs = timeout_secs.unwrap_or(self.config.default_job_timeout_secs);
        let job = self
            .jobs
            .create(run_id, owner_id, runner_id, command, timeout_secs)
            .await?;

        self.runs.suspend_on_job(run_id, job.id).await?;
        self.events
            .append(
                run_id,
                "worker_spawned",
                json!({
                    "job_id": job.id,
                    "runner_id": runner_id,
                    "capabilities": runner.capabilities,
                    "tool_call_id": tool_call_id,
                    "command_preview": preview(command, 80),
                }),
            )
            .await?;

        let this = Arc::clone(self);
        let owner_id = owner_id.to_string();
        let runner_id = runner_id.to_string();
        let command = command.to_string();
        let tool_call_id = tool_call_id.to_string();
        tokio::spawn(async move {
            this.run_to_completion(run_id, job.id, owner_id, runner_id, command, tool_call_id, timeout_secs)
                .await;
        });

        Ok(DispatchOutcome { job_id: job.id })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_to_completion(
        &self,
        run_id: i64,
        job_id: i64,
        owner_id: String,
        runner_id: String,
        command: String,
        tool_call_id: String,
        timeout_secs: u32,
    ) {
        let key = foreman_transport::ConnectionKey { owner_id, runner_id };

        let rx = match self.transport.begin(key, job_id, command, timeout_secs).await {
            Ok(rx) => rx,
            Err(err) => {
                self.finish_job_and_resume(
                    run_id,
                    job_id,
                    &tool_call_id,
                    WorkerJobStatus::Failed,
                    None,
                    None,
                    Some(&err.to_string()),
                    Some(&err.to_string()),
                )
                .await;
                return;
            }
        };

        if let Err(e) = self.jobs.mark_running(job_id).await {
            tracing::error!(job_id, error = %e, "failed to mark worker job running");
        }
        if let Err(e) = self.events.append(run_id, "worker_started", json!({"job_id": job_id})).await {
            tracing::error!(job_id, error = %e, "failed to emit worker_started");
        }

        let outcome = self.transport.wait(rx, job_id, timeout_secs).await;
        self.handle_outcome(run_id, job_id, &tool_call_id, outcome).await;
    }

    async fn handle_outcome(
        &self,
        run_id: i64,
        job_id: i64,
        tool_call_id: &str,
        outcome: Result<JobOutcome, DispatchError>,
    ) {
        match outcome {
            Ok(JobOutcome::Success { exit_code, stdout, stderr, duration_ms: _ }) => {
                let status = if exit_code == 0 {
                    WorkerJobStatus::Succeeded
                } else {
                    WorkerJobStatus::Failed
                };
                self.finish_job_and_resume(
                    run_id,
                    job_id,
                    tool_call_id,
                    status,
                    Some(exit_code),
                    Some(&stdout),
                    Some(&stderr),
                    None,
                )
                .await;
            }
            Ok(JobOutcome::Error { message, critical }) => {
                self.finish_job_and_resume(
                    run_id,
                    job_id,
                    tool_call_id,
                    WorkerJobStatus::Failed,
                    None,
                    None,
                    Some(&message),
                    if critical { Some(&message) } else { None },
                )
                .await;
            }
            Err(DispatchError::TimedOut) => {
                self.finish_job_and_resume(
                    run_id,
                    job_id,
                    tool_call_id,
                    WorkerJobStatus::TimedOut,
                    None,
                    None,
                    Some("timed out"),
                    None,
                )
                .await;
            }
            Err(err) => {
                self.finish_job_and_resume(
                    run_id,
                    job_id,
                    tool_call_id,
                    WorkerJobStatus::Failed,
                    None,
                    None,
                    Some(&err.to_string()),
                    None,
                )
                .await;
            }
        }
    }

    /// On a successful worker result whose full text exceeds the
    /// configured threshold, compress it; summarizer failure falls back
    /// to head-truncation rather than blocking the resume.
    async fn summarize_if_needed(&self, text: &str) -> String {
        if text.chars().count() <= self.config.summarize_threshold_chars as usize {
            return text.to_string();
        }
        if let Some(summarizer) = &self.summarizer {
            if let Ok(summary) = summarizer.summarize(text).await {
                return summary;
            }
        }
        preview(text, self.config.truncate_fallback_chars as usize)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_job_and_resume(
        &self,
        run_id: i64,
        job_id: i64,
        tool_call_id: &str,
        status: WorkerJobStatus,
        exit_code: Option<i32>,
        stdout: Option<&str>,
        stderr: Option<&str>,
        critical_error: Option<&str>,
    ) {
        if let Err(e) = self
            .jobs
            .mark_terminal(job_id, status, exit_code, stdout, stderr, critical_error)
            .await
        {
            tracing::error!(job_id, error = %e, "failed to persist worker job terminal state");
            return;
        }

        let event_type = if matches!(status, WorkerJobStatus::Succeeded) {
            "worker_complete"
        } else {
            "worker_failed"
        };
        if let Err(e) = self
            .events
            .append(
                run_id,
                event_type,
                json!({"job_id": job_id, "status": status, "critical": critical_error.is_some()}),
            )
            .await
        {
            tracing::error!(job_id, error = %e, "failed to emit worker terminal event");
        }

        // At-most-one resume (I4): only a caller that wins this CAS
        // appends the tool-result message and wakes the supervisor.
        // Every other caller — including a crash-recovery replay that
        // independently notices the same terminal job — sees `false`
        // and does nothing further.
        let won = match self.runs.try_resume(run_id, job_id).await {
            Ok(won) => won,
            Err(e) => {
                tracing::error!(run_id, job_id, error = %e, "try_resume failed");
                return;
            }
        };
        if !won {
            tracing::debug!(run_id, job_id, "resume skipped: run not waiting on this job");
            return;
        }

        let summary = match stdout {
            Some(s) if matches!(status, WorkerJobStatus::Succeeded) => {
                self.summarize_if_needed(s).await
            }
            _ => stderr.or(critical_error).unwrap_or("worker job failed").to_string(),
        };
        let marker = format!("[EVIDENCE:run_id={run_id},job_id={job_id}]");
        let run = match self.runs.get_run(run_id).await {
            Ok(Some(run)) => run,
            _ => {
                tracing::error!(run_id, "resume won but run vanished");
                return;
            }
        };
        if run.status != RunStatus::Running {
            // Cancelled between the CAS and here — still record the
            // result, just don't re-enter the step loop.
            tracing::debug!(run_id, status = ?run.status, "run no longer running after resume");
        }
        if let Err(e) = self
            .runs
            .append_message(
                run.thread_id,
                Some(run_id),
                MessageRole::Tool,
                json!({
                    "tool_call_id": tool_call_id,
                    "content": format!("{summary}\n\n{marker}"),
                }),
                Some(job_id),
            )
            .await
        {
            tracing::error!(run_id, job_id, error = %e, "failed to append tool-result message");
            return;
        }

        self.resumer.resume(run_id, job_id).await;
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}\u{2026}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_passes_short_text_through() {
        assert_eq!(preview("hello", 10), "hello");
    }

    #[test]
    fn preview_truncates_and_marks_long_text() {
        let long = "x".repeat(200);
        let truncated = preview(&long, 150);
        assert_eq!(truncated.chars().count(), 151);
        assert!(truncated.ends_with('\u{2026}'));
    }
}
