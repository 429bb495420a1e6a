//! `AppState` construction, shared by the `serve` and `queue worker` commands.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use foreman_dispatcher::WorkerDispatcher;
use foreman_domain::config::{Config, ConfigSeverity};
use foreman_llm::build_chat_client;
use foreman_queue::{JobSchedule, Scheduler};
use foreman_store::{EventStore, JobStore, Pool, QueueStore, RunStore, RunnerStore};
use foreman_stream::StreamAssembler;
use foreman_supervisor::{SupervisorEngine, ToolRegistry};
use foreman_transport::{ConnectionManager, Dispatch};

use crate::state::AppState;

/// Validate config, connect to storage, wire the supervisor/dispatcher
/// cycle, and return a fully-assembled [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let pool = Pool::connect(&config.store)
        .await
        .context("connecting to store and running migrations")?;
    tracing::info!(dialect = ?pool.dialect(), "store connected, migrations applied");

    let runs = RunStore::new(pool.clone());
    let jobs = JobStore::new(pool.clone());
    let runners = RunnerStore::new(pool.clone());
    let events = EventStore::new(pool.clone());
    let queue = QueueStore::new(pool.clone());

    // ── Runner transport ─────────────────────────────────────────────
    let connections = Arc::new(ConnectionManager::new());
    let dispatch = Dispatch::new(connections.clone());

    // ── LLM ──────────────────────────────────────────────────────────
    let chat = build_chat_client(&config.llm).context("initializing LLM providers")?;
    let chat = match chat {
        Some(c) => c,
        None => anyhow::bail!(
            "no chat-capable LLM provider configured; the supervisor engine cannot run without one"
        ),
    };

    // ── Local tools ──────────────────────────────────────────────────
    // spawn_worker is wired in by the supervisor engine itself; no
    // additional local tools are registered by default.
    let tools = ToolRegistry::new();

    // ── Supervisor + dispatcher (constructed as a cycle) ──────────────
    let runs_for_dispatcher = runs.clone();
    let jobs_for_dispatcher = jobs.clone();
    let runners_for_dispatcher = runners.clone();
    let events_for_dispatcher = events.clone();
    let dispatch_for_dispatcher = dispatch.clone();
    let dispatcher_config = config.dispatcher.clone();

    let engine = SupervisorEngine::new_cyclic(
        runs.clone(),
        events.clone(),
        jobs.clone(),
        chat,
        tools,
        config.supervisor.clone(),
        move |resumer| {
            WorkerDispatcher::new(
                runs_for_dispatcher,
                jobs_for_dispatcher,
                runners_for_dispatcher,
                events_for_dispatcher,
                dispatch_for_dispatcher,
                dispatcher_config,
                resumer,
            )
        },
    );
    tracing::info!("supervisor engine ready");

    // ── Stream assembler ──────────────────────────────────────────────
    let stream = Arc::new(StreamAssembler::new(
        events.clone(),
        runs.clone(),
        config.stream.clone(),
    ));

    // ── Scheduler (only when recurring schedules are configured) ─────
    let scheduler = build_scheduler(&config, queue.clone());

    // ── Admin token (read once, hash for constant-time comparison) ───
    let admin_token_hash = match std::env::var(&config.admin.token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %config.admin.token_env, "admin bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.admin.token_env,
                "admin bearer-token auth DISABLED — set {} to enable",
                config.admin.token_env
            );
            None
        }
    };

    Ok(AppState {
        config,
        runs,
        jobs,
        runners,
        events,
        queue,
        connections,
        dispatch,
        engine,
        stream,
        scheduler,
        admin_token_hash,
    })
}

/// The built-in recurring schedules this deployment runs, if any. There
/// are none baked in today; operators add schedules by extending this
/// list. Returns `None` when the list is empty so `serve` doesn't spin
/// up an idle scheduler task.
fn build_scheduler(config: &Config, queue: QueueStore) -> Option<Arc<Scheduler>> {
    let schedules: Vec<JobSchedule> = Vec::new();
    if schedules.is_empty() {
        return None;
    }
    Some(Arc::new(Scheduler::new(
        queue,
        config.queue.clone(),
        schedules,
    )))
}
