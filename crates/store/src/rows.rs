//! Row shapes as they come back from `sqlx::query_as`, and the
//! conversions into `foreman_domain::entities` types.
//!
//! Kept distinct from the domain entities themselves: a row carries
//! wire-format details (status as a bare string, capabilities as a
//! JSON array) that the domain types represent as proper enums, and
//! collapsing the two would leak storage concerns into the domain
//! crate.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use foreman_domain::capability::Capability;
use foreman_domain::entities::{
    DeviceToken, MessageRole, QueueItem, QueueItemStatus, Run, RunEvent, RunStatus, Runner,
    RunnerStatus, Thread, ThreadMessage, WorkerJob, WorkerJobStatus,
};
use foreman_domain::{Error, Result};

fn parse_status<T>(raw: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|e| Error::Store(format!("invalid status {raw:?}: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub thread_id: i64,
    pub owner_id: String,
    pub status: String,
    pub step_count: i64,
    pub waiting_on_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunRow {
    pub fn into_entity(self) -> Result<Run> {
        Ok(Run {
            id: self.id,
            thread_id: self.thread_id,
            owner_id: self.owner_id,
            status: parse_status::<RunStatus>(&self.status)?,
            step_count: self.step_count as u32,
            waiting_on_job_id: self.waiting_on_job_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
            error: self.error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ThreadRow {
    pub id: i64,
    pub owner_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub compacted_through_message_id: Option<i64>,
}

impl ThreadRow {
    pub fn into_entity(self) -> Thread {
        Thread {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
            compacted_through_message_id: self.compacted_through_message_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ThreadMessageRow {
    pub id: i64,
    pub thread_id: i64,
    pub run_id: Option<i64>,
    pub role: String,
    pub content: Value,
    pub worker_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ThreadMessageRow {
    pub fn into_entity(self) -> Result<ThreadMessage> {
        Ok(ThreadMessage {
            id: self.id,
            thread_id: self.thread_id,
            run_id: self.run_id,
            role: parse_status::<MessageRole>(&self.role)?,
            content: self.content,
            worker_job_id: self.worker_job_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RunnerRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: String,
    pub capabilities: Value,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RunnerRow {
    pub fn into_entity(self) -> Result<Runner> {
        let capabilities: Vec<Capability> = serde_json::from_value(self.capabilities)
            .map_err(|e| Error::Store(format!("invalid capabilities json: {e}")))?;
        Ok(Runner {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            status: parse_status::<RunnerStatus>(&self.status)?,
            capabilities,
            last_heartbeat_at: self.last_heartbeat_at,
            created_at: self.created_at,
            revoked_at: self.revoked_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DeviceTokenRow {
    pub id: Uuid,
    pub runner_id: String,
    pub owner_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

impl DeviceTokenRow {
    pub fn into_entity(self) -> DeviceToken {
        DeviceToken {
            id: self.id,
            runner_id: self.runner_id,
            owner_id: self.owner_id,
            token_hash: self.token_hash,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct WorkerJobRow {
    pub id: i64,
    pub run_id: i64,
    pub owner_id: String,
    pub runner_id: String,
    pub command: String,
    pub status: String,
    pub timeout_secs: i64,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub critical_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkerJobRow {
    pub fn into_entity(self) -> Result<WorkerJob> {
        Ok(WorkerJob {
            id: self.id,
            run_id: self.run_id,
            owner_id: self.owner_id,
            runner_id: self.runner_id,
            command: self.command,
            status: parse_status::<WorkerJobStatus>(&self.status)?,
            timeout_secs: self.timeout_secs as u32,
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
            critical_error: self.critical_error,
            created_at: self.created_at,
            dispatched_at: self.dispatched_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RunEventRow {
    pub id: i64,
    pub run_id: i64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl RunEventRow {
    pub fn into_entity(self) -> RunEvent {
        RunEvent {
            id: self.id,
            run_id: self.run_id,
            event_type: self.event_type,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct QueueItemRow {
    pub id: i64,
    pub job_name: String,
    pub payload: Value,
    pub status: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub lease_secs: i64,
    pub last_error: Option<String>,
}

impl QueueItemRow {
    pub fn into_entity(self) -> Result<QueueItem> {
        Ok(QueueItem {
            id: self.id,
            job_name: self.job_name,
            payload: self.payload,
            status: parse_status::<QueueItemStatus>(&self.status)?,
            scheduled_for: self.scheduled_for,
            created_at: self.created_at,
            claimed_at: self.claimed_at,
            heartbeat_at: self.heartbeat_at,
            worker_id: self.worker_id,
            attempts: self.attempts as u32,
            max_attempts: self.max_attempts as u32,
            lease_secs: self.lease_secs as u32,
            last_error: self.last_error,
        })
    }
}

/// Serialize an enum the same way across both dialects: as the bare
/// snake_case string `parse_status` expects back.
pub fn status_str<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value).map_err(|e| Error::Store(e.to_string()))? {
        Value::String(s) => Ok(s),
        other => Err(Error::Store(format!("expected string status, got {other}"))),
    }
}
