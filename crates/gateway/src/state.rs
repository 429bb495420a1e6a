//! Shared application state passed to all API handlers.

use std::sync::Arc;

use foreman_domain::config::Config;
use foreman_queue::Scheduler;
use foreman_store::{EventStore, JobStore, QueueStore, RunStore, RunnerStore};
use foreman_stream::StreamAssembler;
use foreman_supervisor::SupervisorEngine;
use foreman_transport::{ConnectionManager, Dispatch};

/// Everything an API handler needs to serve a request.
///
/// Fields are grouped by concern:
/// - **Config** — the resolved, validated configuration
/// - **Persistence** — the stores backing runs, jobs, runners, events, queue
/// - **Runner transport** — WebSocket connection bookkeeping and job dispatch
/// - **Orchestration** — the supervisor engine driving the ReAct loop
/// - **Streaming** — replay + live-tail assembly for `GET /stream/runs/:id`
/// - **Security** — the admin bearer-token hash
#[derive(Clone)]
pub struct AppState {
    // ── Config ───────────────────────────────────────────────────────
    pub config: Arc<Config>,

    // ── Persistence ──────────────────────────────────────────────────
    pub runs: RunStore,
    pub jobs: JobStore,
    pub runners: RunnerStore,
    pub events: EventStore,
    pub queue: QueueStore,

    // ── Runner transport ─────────────────────────────────────────────
    pub connections: Arc<ConnectionManager>,
    pub dispatch: Dispatch,

    // ── Orchestration ────────────────────────────────────────────────
    pub engine: Arc<SupervisorEngine>,

    // ── Streaming ────────────────────────────────────────────────────
    pub stream: Arc<StreamAssembler>,

    // ── Background scheduling (optional, only when schedules configured) ──
    pub scheduler: Option<Arc<Scheduler>>,

    // ── Security ─────────────────────────────────────────────────────
    /// SHA-256 digest of the admin bearer token, read once at startup.
    /// `None` means admin auth is disabled (dev mode).
    pub admin_token_hash: Option<Vec<u8>>,
}
