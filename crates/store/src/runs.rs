//! Thread, ThreadMessage and Run persistence.

use chrono::Utc;
use serde_json::Value;

use foreman_domain::entities::{MessageRole, Run, RunStatus, Thread, ThreadMessage};
use foreman_domain::{Error, Result};

use crate::pool::Pool;
use crate::rows::{status_str, RunRow, ThreadMessageRow, ThreadRow};

#[derive(Clone)]
pub struct RunStore {
    pool: Pool,
}

impl RunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create_thread(&self, owner_id: &str, title: Option<&str>) -> Result<Thread> {
        let now = Utc::now();
        let row: ThreadRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO threads (owner_id, title, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 RETURNING id, owner_id, title, created_at, updated_at, compacted_through_message_id",
            )
            .bind(owner_id)
            .bind(title)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_thread: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO threads (owner_id, title, created_at, updated_at) \
                 VALUES ($1, $2, $3, $3) \
                 RETURNING id, owner_id, title, created_at, updated_at, compacted_through_message_id",
            )
            .bind(owner_id)
            .bind(title)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_thread: {e}")))?,
        };
        Ok(row.into_entity())
    }

    pub async fn get_thread(&self, thread_id: i64) -> Result<Option<Thread>> {
        let row: Option<ThreadRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, owner_id, title, created_at, updated_at, compacted_through_message_id \
                 FROM threads WHERE id = ?1",
            )
            .bind(thread_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_thread: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, owner_id, title, created_at, updated_at, compacted_through_message_id \
                 FROM threads WHERE id = $1",
            )
            .bind(thread_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_thread: {e}")))?,
        };
        Ok(row.map(ThreadRow::into_entity))
    }

    pub async fn append_message(
        &self,
        thread_id: i64,
        run_id: Option<i64>,
        role: MessageRole,
        content: Value,
        worker_job_id: Option<i64>,
    ) -> Result<ThreadMessage> {
        let role_str = status_str(&role)?;
        let now = Utc::now();
        let row: ThreadMessageRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO thread_messages (thread_id, run_id, role, content, worker_job_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 RETURNING id, thread_id, run_id, role, content, worker_job_id, created_at",
            )
            .bind(thread_id)
            .bind(run_id)
            .bind(&role_str)
            .bind(&content)
            .bind(worker_job_id)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("append_message: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO thread_messages (thread_id, run_id, role, content, worker_job_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, thread_id, run_id, role, content, worker_job_id, created_at",
            )
            .bind(thread_id)
            .bind(run_id)
            .bind(&role_str)
            .bind(&content)
            .bind(worker_job_id)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("append_message: {e}")))?,
        };
        row.into_entity()
    }

    /// Messages after `compacted_through_message_id`, in order — the
    /// context a supervisor step replays into the LLM call.
    pub async fn history(&self, thread: &Thread) -> Result<Vec<ThreadMessage>> {
        let after = thread.compacted_through_message_id.unwrap_or(0);
        let rows: Vec<ThreadMessageRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, thread_id, run_id, role, content, worker_job_id, created_at \
                 FROM thread_messages WHERE thread_id = ?1 AND id > ?2 ORDER BY id ASC",
            )
            .bind(thread.id)
            .bind(after)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("history: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, thread_id, run_id, role, content, worker_job_id, created_at \
                 FROM thread_messages WHERE thread_id = $1 AND id > $2 ORDER BY id ASC",
            )
            .bind(thread.id)
            .bind(after)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("history: {e}")))?,
        };
        rows.into_iter().map(ThreadMessageRow::into_entity).collect()
    }

    pub async fn mark_compacted_through(&self, thread_id: i64, message_id: i64) -> Result<()> {
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE threads SET compacted_through_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                )
                .bind(message_id)
                .bind(Utc::now())
                .bind(thread_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE threads SET compacted_through_message_id = $1, updated_at = $2 WHERE id = $3",
                )
                .bind(message_id)
                .bind(Utc::now())
                .bind(thread_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("mark_compacted_through: {e}")))?;
        Ok(())
    }

    pub async fn create_run(&self, thread_id: i64, owner_id: &str) -> Result<Run> {
        let now = Utc::now();
        let status = status_str(&RunStatus::Running)?;
        let row: RunRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO runs (thread_id, owner_id, status, step_count, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, 0, ?4, ?4) \
                 RETURNING id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error",
            )
            .bind(thread_id)
            .bind(owner_id)
            .bind(&status)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_run: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO runs (thread_id, owner_id, status, step_count, created_at, updated_at) \
                 VALUES ($1, $2, $3, 0, $4, $4) \
                 RETURNING id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error",
            )
            .bind(thread_id)
            .bind(owner_id)
            .bind(&status)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_run: {e}")))?,
        };
        row.into_entity()
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        let row: Option<RunRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error \
                 FROM runs WHERE id = ?1",
            )
            .bind(run_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_run: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error \
                 FROM runs WHERE id = $1",
            )
            .bind(run_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get_run: {e}")))?,
        };
        row.map(RunRow::into_entity).transpose()
    }

    /// Move a run to `Waiting` on a worker job, incrementing its step
    /// count. This is the write side of the durable suspend.
    pub async fn suspend_on_job(&self, run_id: i64, job_id: i64) -> Result<()> {
        let status = status_str(&RunStatus::Waiting)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = ?1, waiting_on_job_id = ?2, step_count = step_count + 1, updated_at = ?3 \
                     WHERE id = ?4",
                )
                .bind(&status)
                .bind(job_id)
                .bind(Utc::now())
                .bind(run_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = $1, waiting_on_job_id = $2, step_count = step_count + 1, updated_at = $3 \
                     WHERE id = $4",
                )
                .bind(&status)
                .bind(job_id)
                .bind(Utc::now())
                .bind(run_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("suspend_on_job: {e}")))?;
        Ok(())
    }

    /// Resume a waiting run back to `Running`, clearing the wait.
    ///
    /// A conditional update, not a blind one: the `WHERE` clause only
    /// matches a run that is still `Waiting` on exactly this job. Two
    /// dispatcher completions racing to resume the same run (a
    /// duplicate job result, a reclaim firing after the original
    /// result already landed) will see exactly one `rows_affected() ==
    /// 1` and the other `0` — the caller uses that to decide whether
    /// it actually won the resume, satisfying at-most-one-resume.
    pub async fn try_resume(&self, run_id: i64, job_id: i64) -> Result<bool> {
        let waiting = status_str(&RunStatus::Waiting)?;
        let running = status_str(&RunStatus::Running)?;
        let rows_affected = match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = ?1, waiting_on_job_id = NULL, updated_at = ?2 \
                     WHERE id = ?3 AND status = ?4 AND waiting_on_job_id = ?5",
                )
                .bind(&running)
                .bind(Utc::now())
                .bind(run_id)
                .bind(&waiting)
                .bind(job_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = $1, waiting_on_job_id = NULL, updated_at = $2 \
                     WHERE id = $3 AND status = $4 AND waiting_on_job_id = $5",
                )
                .bind(&running)
                .bind(Utc::now())
                .bind(run_id)
                .bind(&waiting)
                .bind(job_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("try_resume: {e}")))?
        .rows_affected();
        Ok(rows_affected == 1)
    }

    /// Increment the step counter for a ReAct loop iteration that
    /// doesn't suspend (a text-only turn, or a turn whose tool calls
    /// were all local). Returns the updated count so the caller can
    /// check it against the step ceiling without a separate fetch.
    pub async fn bump_step(&self, run_id: i64) -> Result<u32> {
        let row: (i64,) = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "UPDATE runs SET step_count = step_count + 1, updated_at = ?1 WHERE id = ?2 \
                 RETURNING step_count",
            )
            .bind(Utc::now())
            .bind(run_id)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("bump_step: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "UPDATE runs SET step_count = step_count + 1, updated_at = $1 WHERE id = $2 \
                 RETURNING step_count",
            )
            .bind(Utc::now())
            .bind(run_id)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("bump_step: {e}")))?,
        };
        Ok(row.0 as u32)
    }

    pub async fn finish(&self, run_id: i64, status: RunStatus, error: Option<&str>) -> Result<()> {
        let status_str = status_str(&status)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = ?1, error = ?2, finished_at = ?3, updated_at = ?3 WHERE id = ?4",
                )
                .bind(&status_str)
                .bind(error)
                .bind(Utc::now())
                .bind(run_id)
                .execute(pool)
                .await
            }
            Pool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE runs SET status = $1, error = $2, finished_at = $3, updated_at = $3 WHERE id = $4",
                )
                .bind(&status_str)
                .bind(error)
                .bind(Utc::now())
                .bind(run_id)
                .execute(pool)
                .await
            }
        }
        .map_err(|e| Error::Store(format!("finish: {e}")))?;
        Ok(())
    }

    /// Runs left `Waiting` with no progress for longer than any sane
    /// job timeout — candidates for the supervisor's own crash-recovery
    /// sweep on startup.
    pub async fn find_stuck_waiting(&self, older_than_secs: i64) -> Result<Vec<Run>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs);
        let status = status_str(&RunStatus::Waiting)?;
        let rows: Vec<RunRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error \
                 FROM runs WHERE status = ?1 AND updated_at < ?2",
            )
            .bind(&status)
            .bind(cutoff)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("find_stuck_waiting: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, thread_id, owner_id, status, step_count, waiting_on_job_id, created_at, updated_at, finished_at, error \
                 FROM runs WHERE status = $1 AND updated_at < $2",
            )
            .bind(&status)
            .bind(cutoff)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("find_stuck_waiting: {e}")))?,
        };
        rows.into_iter().map(RunRow::into_entity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_to_plain_snake_case_string() {
        assert_eq!(status_str(&MessageRole::Tool).unwrap(), "tool");
        assert_eq!(status_str(&MessageRole::Summary).unwrap(), "summary");
    }

    #[test]
    fn run_status_serializes_to_plain_snake_case_string() {
        assert_eq!(status_str(&RunStatus::Waiting).unwrap(), "waiting");
    }
}
