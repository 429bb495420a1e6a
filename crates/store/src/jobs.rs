//! WorkerJob persistence — the record of one `spawn_worker` dispatch.

use chrono::Utc;

use foreman_domain::entities::{WorkerJob, WorkerJobStatus};
use foreman_domain::{Error, Result};

use crate::pool::Pool;
use crate::rows::{status_str, WorkerJobRow};

#[derive(Clone)]
pub struct JobStore {
    pool: Pool,
}

impl JobStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        run_id: i64,
        owner_id: &str,
        runner_id: &str,
        command: &str,
        timeout_secs: u32,
    ) -> Result<WorkerJob> {
        let now = Utc::now();
        let status = status_str(&WorkerJobStatus::Queued)?;
        let row: WorkerJobRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO worker_jobs (run_id, owner_id, runner_id, command, status, timeout_secs, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 RETURNING id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at",
            )
            .bind(run_id)
            .bind(owner_id)
            .bind(runner_id)
            .bind(command)
            .bind(&status)
            .bind(timeout_secs as i64)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_job: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO worker_jobs (run_id, owner_id, runner_id, command, status, timeout_secs, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at",
            )
            .bind(run_id)
            .bind(owner_id)
            .bind(runner_id)
            .bind(command)
            .bind(&status)
            .bind(timeout_secs as i64)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_job: {e}")))?,
        };
        row.into_entity()
    }

    pub async fn get(&self, job_id: i64) -> Result<Option<WorkerJob>> {
        let row: Option<WorkerJobRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at \
                 FROM worker_jobs WHERE id = ?1",
            )
            .bind(job_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_job: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at \
                 FROM worker_jobs WHERE id = $1",
            )
            .bind(job_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_job: {e}")))?,
        };
        row.map(WorkerJobRow::into_entity).transpose()
    }

    /// Mark a job dispatched: the transport accepted it and the runner
    /// has started working on it.
    pub async fn mark_running(&self, job_id: i64) -> Result<()> {
        let status = status_str(&WorkerJobStatus::Running)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE worker_jobs SET status = ?1, dispatched_at = ?2 WHERE id = ?3")
                    .bind(&status)
                    .bind(Utc::now())
                    .bind(job_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE worker_jobs SET status = $1, dispatched_at = $2 WHERE id = $3")
                    .bind(&status)
                    .bind(Utc::now())
                    .bind(job_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("mark_running: {e}")))?;
        Ok(())
    }

    /// Record a terminal outcome reported by the runner (or the
    /// validator, for a pre-dispatch rejection).
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_terminal(
        &self,
        job_id: i64,
        status: WorkerJobStatus,
        exit_code: Option<i32>,
        stdout: Option<&str>,
        stderr: Option<&str>,
        critical_error: Option<&str>,
    ) -> Result<()> {
        let status_str = status_str(&status)?;
        let now = Utc::now();
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE worker_jobs SET status = ?1, exit_code = ?2, stdout = ?3, stderr = ?4, \
                     critical_error = ?5, finished_at = ?6 WHERE id = ?7",
                )
                .bind(&status_str)
                .bind(exit_code)
                .bind(stdout)
                .bind(stderr)
                .bind(critical_error)
                .bind(now)
                .bind(job_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE worker_jobs SET status = $1, exit_code = $2, stdout = $3, stderr = $4, \
                     critical_error = $5, finished_at = $6 WHERE id = $7",
                )
                .bind(&status_str)
                .bind(exit_code)
                .bind(stdout)
                .bind(stderr)
                .bind(critical_error)
                .bind(now)
                .bind(job_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("mark_terminal: {e}")))?;
        Ok(())
    }

    /// Worker jobs still `Running` whose dispatch is older than a sane
    /// timeout ceiling — candidates for a startup reconciliation sweep
    /// alongside `RunStore::find_stuck_waiting`.
    pub async fn find_stuck_running(&self, older_than_secs: i64) -> Result<Vec<WorkerJob>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs);
        let status = status_str(&WorkerJobStatus::Running)?;
        let rows: Vec<WorkerJobRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at \
                 FROM worker_jobs WHERE status = ?1 AND dispatched_at < ?2",
            )
            .bind(&status)
            .bind(cutoff)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("find_stuck_running: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, run_id, owner_id, runner_id, command, status, timeout_secs, exit_code, stdout, stderr, critical_error, created_at, dispatched_at, finished_at \
                 FROM worker_jobs WHERE status = $1 AND dispatched_at < $2",
            )
            .bind(&status)
            .bind(cutoff)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("find_stuck_running: {e}")))?,
        };
        rows.into_iter().map(WorkerJobRow::into_entity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_job_status_serializes_to_plain_snake_case_string() {
        assert_eq!(status_str(&WorkerJobStatus::TimedOut).unwrap(), "timed_out");
        assert_eq!(status_str(&WorkerJobStatus::Rejected).unwrap(), "rejected");
    }
}
