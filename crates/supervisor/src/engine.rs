//! The Supervisor Engine: the ReAct step loop that drives a run from
//! creation to a terminal state, suspending on `spawn_worker` and
//! re-entering fresh on resume.
//!
//! Grounded in the reference gateway's `runtime/turn.rs` (`run_turn` /
//! `run_turn_inner`), but restructured around durable suspension: where
//! the original holds its loop state on the stack across a worker
//! call, here every suspend point is a return — the run row and thread
//! messages are the only state that survives it.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Value};

use foreman_domain::config::SupervisorConfig;
use foreman_domain::entities::{MessageRole, Run, RunStatus, Thread};
use foreman_domain::envelope::{ErrorType, ToolOutcome};
use foreman_domain::stream::{BoxStream, StreamEvent};
use foreman_domain::tool::{ToolCall, ToolDefinition};
use foreman_store::{EventStore, JobStore, RunStore};

use foreman_dispatcher::{DispatcherError, WorkerDispatcher};

use crate::cancel::CancelRegistry;
use crate::chat::{ChatClient, ChatError, ChatRequest};
use crate::compaction;
use crate::evidence;
use crate::message;
use crate::tools::ToolRegistry;

const SPAWN_WORKER_TOOL: &str = "spawn_worker";

/// What a single `step()` call produced. `drive()` loops on `Continue`,
/// returns on everything else.
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    Suspended,
    Done(String),
    Failed(String),
}

pub struct SupervisorEngine {
    runs: RunStore,
    events: EventStore,
    jobs: JobStore,
    chat: Arc<dyn ChatClient>,
    tools: ToolRegistry,
    dispatcher: Arc<WorkerDispatcher>,
    config: SupervisorConfig,
    cancel: CancelRegistry,
}

impl SupervisorEngine {
    pub fn new(
        runs: RunStore,
        events: EventStore,
        jobs: JobStore,
        chat: Arc<dyn ChatClient>,
        tools: ToolRegistry,
        dispatcher: Arc<WorkerDispatcher>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            runs,
            events,
            jobs,
            chat,
            tools,
            dispatcher,
            config,
            cancel: CancelRegistry::new(),
        }
    }

    /// Build the engine and its `WorkerDispatcher` together.
    ///
    /// `WorkerDispatcher::new` needs a `ResumeHandle` at construction
    /// time, and the only thing that can resume a suspended run is the
    /// engine itself — an `Arc<WorkerDispatcher>` inside an
    /// `Arc<SupervisorEngine>` that points back at it would be a
    /// genuine reference cycle. `make_dispatcher` gets a `Weak` it can
    /// hand to the dispatcher instead; the adapter upgrades it on each
    /// resume, which is always live once `start_run` has been called
    /// (the engine outlives every run it drives).
    pub fn new_cyclic(
        runs: RunStore,
        events: EventStore,
        jobs: JobStore,
        chat: Arc<dyn ChatClient>,
        tools: ToolRegistry,
        config: SupervisorConfig,
        make_dispatcher: impl FnOnce(Arc<dyn foreman_dispatcher::ResumeHandle>) -> WorkerDispatcher,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<SupervisorEngine>| {
            let resumer: Arc<dyn foreman_dispatcher::ResumeHandle> =
                Arc::new(WeakResumer(weak.clone()));
            let dispatcher = Arc::new(make_dispatcher(resumer));
            Self::new(runs, events, jobs, chat, tools, dispatcher, config)
        })
    }

    /// Create a run over `thread_id` and start driving it on a detached
    /// task. Returns as soon as the run row exists — the caller never
    /// blocks on the first step.
    pub async fn start_run(self: &Arc<Self>, thread_id: i64, owner_id: &str) -> foreman_domain::Result<Run> {
        let run = self.runs.create_run(thread_id, owner_id).await?;
        self.cancel.register(run.id);
        self.events
            .append(run.id, "supervisor_started", json!({"thread_id": thread_id, "owner_id": owner_id}))
            .await?;
        let this = Arc::clone(self);
        let run_id = run.id;
        tokio::spawn(async move { this.drive(run_id).await });
        Ok(run)
    }

    /// Signal cancellation. Cooperative: takes effect the next time
    /// `drive` checks between steps, or never, if the run already
    /// finished or is waiting on a worker job whose result has already
    /// committed.
    pub fn cancel_run(&self, run_id: i64) -> bool {
        self.cancel.cancel(run_id)
    }

    async fn drive(&self, run_id: i64) {
        loop {
            let run = match self.runs.get_run(run_id).await {
                Ok(Some(run)) => run,
                Ok(None) => {
                    tracing::error!(run_id, "drive: run vanished mid-loop");
                    return;
                }
                Err(e) => {
                    tracing::error!(run_id, error = %e, "drive: get_run failed");
                    return;
                }
            };

            if run.status.is_terminal() {
                self.cancel.remove(run_id);
                return;
            }

            if self.cancel.is_cancelled(run_id) {
                self.finish_cancelled(run_id).await;
                return;
            }

            match self.step(&run).await {
                StepOutcome::Continue => continue,
                StepOutcome::Suspended => return,
                StepOutcome::Done(text) => {
                    self.finish_terminal(run_id, RunStatus::Done, None, Some(&text)).await;
                    return;
                }
                StepOutcome::Failed(err) => {
                    self.finish_terminal(run_id, RunStatus::Failed, Some(&err), None).await;
                    return;
                }
            }
        }
    }

    async fn finish_cancelled(&self, run_id: i64) {
        if let Err(e) = self.runs.finish(run_id, RunStatus::Cancelled, None).await {
            tracing::error!(run_id, error = %e, "failed to persist cancellation");
        }
        let _ = self.events.append(run_id, "run_cancelled", json!({})).await;
        self.close_stream(run_id, "cancelled").await;
        self.cancel.remove(run_id);
    }

    async fn finish_terminal(&self, run_id: i64, status: RunStatus, error: Option<&str>, final_text: Option<&str>) {
        if let Err(e) = self.runs.finish(run_id, status, error).await {
            tracing::error!(run_id, error = %e, "failed to persist terminal run state");
        }
        let (event_type, payload) = match status {
            RunStatus::Done => ("supervisor_complete", json!({"final_text": final_text})),
            RunStatus::Failed => ("supervisor_failed", json!({"error": error})),
            _ => ("supervisor_failed", json!({"error": error})),
        };
        if let Err(e) = self.events.append(run_id, event_type, payload).await {
            tracing::error!(run_id, error = %e, "failed to emit terminal run event");
        }
        self.close_stream(run_id, "run_finished").await;
        self.cancel.remove(run_id);
    }

    /// Emit the explicit `stream_control{action:"close"}` barrier a
    /// terminal run needs so the Stream Assembler knows to end live
    /// tails instead of relying on the heuristic fallback — see
    /// spec.md §4.5's close-vs-keep-open rule.
    async fn close_stream(&self, run_id: i64, reason: &str) {
        if let Err(e) = self
            .events
            .append(run_id, "stream_control", json!({"action": "close", "reason": reason}))
            .await
        {
            tracing::error!(run_id, error = %e, "failed to emit stream_control close barrier");
        }
        // Drop the broadcast channel now that no new live events will
        // arrive; any subscriber still mid-replay finishes off storage.
        self.events.forget(run_id);
    }

    /// One ReAct turn: assemble context, call the LLM, dispatch
    /// whatever tool calls come back, persist everything durably.
    async fn step(&self, run: &Run) -> StepOutcome {
        if run.step_count >= self.config.step_ceiling {
            return StepOutcome::Failed(format!("step ceiling of {} exceeded", self.config.step_ceiling));
        }

        let thread = match self.runs.get_thread(run.thread_id).await {
            Ok(Some(thread)) => thread,
            Ok(None) => return StepOutcome::Failed("thread not found".to_string()),
            Err(e) => return StepOutcome::Failed(format!("load thread: {e}")),
        };

        let mut history = match self.runs.history(&thread).await {
            Ok(history) => history,
            Err(e) => return StepOutcome::Failed(format!("load history: {e}")),
        };

        if compaction::should_compact(&history, &self.config.compaction) {
            history = self.compact(&thread, &history).await.unwrap_or(history);
        }

        let chat_messages = message::thread_messages_to_chat_messages(&history);
        let chat_messages = evidence::expand_evidence_markers(&self.jobs, &chat_messages).await;

        let mut tool_defs = self.tools.definitions();
        tool_defs.push(spawn_worker_definition());

        let req = ChatRequest {
            messages: chat_messages,
            tools: tool_defs,
            model: None,
            temperature: None,
            max_tokens: None,
        };

        let stream = match self.chat.chat_stream(&req).await {
            Ok(stream) => stream,
            Err(e) => return StepOutcome::Failed(format!("chat request failed: {e}")),
        };
        let (text, tool_calls) = match self.assemble_stream(run.id, stream).await {
            Ok(parsed) => parsed,
            Err(e) => return StepOutcome::Failed(format!("chat stream failed: {e}")),
        };

        let assistant_content = if tool_calls.is_empty() {
            message::assistant_text_content(&text)
        } else {
            message::assistant_tool_call_content(&text, &tool_calls)
        };
        if let Err(e) = self
            .runs
            .append_message(thread.id, Some(run.id), MessageRole::Assistant, assistant_content, None)
            .await
        {
            return StepOutcome::Failed(format!("persist assistant message: {e}"));
        }

        if tool_calls.is_empty() {
            return StepOutcome::Done(text);
        }

        let (spawn_calls, local_calls): (Vec<ToolCall>, Vec<ToolCall>) =
            tool_calls.into_iter().partition(|tc| tc.tool_name == SPAWN_WORKER_TOOL);

        let local_outcomes = join_all(local_calls.iter().map(|tc| self.run_local_tool(run.id, tc))).await;
        for (tc, outcome) in local_calls.iter().zip(local_outcomes) {
            if let Err(e) = self.persist_tool_result(&thread, run.id, &tc.call_id, &outcome).await {
                tracing::error!(run_id = run.id, error = %e, "failed to persist local tool result");
            }
        }

        let Some(first_spawn) = spawn_calls.first() else {
            return self.advance(run.id).await;
        };

        // Only one job can be in flight per run — drop any extras with
        // an explicit error rather than silently ignoring them.
        for extra in spawn_calls.iter().skip(1) {
            let outcome = ToolOutcome::err(
                ErrorType::ValidationError,
                "only one spawn_worker call may be in flight per run; this call was dropped",
            );
            if let Err(e) = self.persist_tool_result(&thread, run.id, &extra.call_id, &outcome).await {
                tracing::error!(run_id = run.id, error = %e, "failed to persist dropped spawn_worker result");
            }
        }

        match self.dispatch_spawn_worker(run.id, &run.owner_id, first_spawn).await {
            Ok(()) => StepOutcome::Suspended,
            Err(outcome) => {
                if let Err(e) = self.persist_tool_result(&thread, run.id, &first_spawn.call_id, &outcome).await {
                    tracing::error!(run_id = run.id, error = %e, "failed to persist spawn_worker error result");
                }
                self.advance(run.id).await
            }
        }
    }

    /// Bump the step counter for an iteration that didn't suspend and
    /// report it as `Continue`; a step that does suspend gets its
    /// counter bump for free from `RunStore::suspend_on_job`.
    async fn advance(&self, run_id: i64) -> StepOutcome {
        if let Err(e) = self.runs.bump_step(run_id).await {
            tracing::warn!(run_id, error = %e, "failed to bump step count");
        }
        StepOutcome::Continue
    }

    async fn compact(
        &self,
        thread: &Thread,
        history: &[foreman_domain::entities::ThreadMessage],
    ) -> Option<Vec<foreman_domain::entities::ThreadMessage>> {
        let (to_compact, _) = compaction::split_for_compaction(history, self.config.compaction.keep_last_messages);
        let last = to_compact.last()?;
        let summary = match compaction::generate_summary(self.chat.as_ref(), to_compact).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(thread_id = thread.id, error = %e, "compaction summarization failed, continuing uncompacted");
                return None;
            }
        };
        if let Err(e) = self
            .runs
            .append_message(thread.id, None, MessageRole::Summary, json!(summary), None)
            .await
        {
            tracing::warn!(thread_id = thread.id, error = %e, "failed to persist compaction summary");
            return None;
        }
        if let Err(e) = self.runs.mark_compacted_through(thread.id, last.id).await {
            tracing::warn!(thread_id = thread.id, error = %e, "failed to mark compaction boundary");
            return None;
        }
        self.runs.history(thread).await.ok()
    }

    /// Drain the chat stream, persisting a `supervisor_token` event for
    /// every text chunk as it arrives so SSE subscribers see output
    /// incrementally rather than only once the turn finishes.
    async fn assemble_stream(
        &self,
        run_id: i64,
        mut stream: BoxStream<'static, StreamEvent>,
    ) -> Result<(String, Vec<ToolCall>), ChatError> {
        use futures_util::StreamExt;

        let mut text = String::new();
        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, PendingToolCall> = HashMap::new();
        let mut finished: HashMap<String, ToolCall> = HashMap::new();

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token { text: chunk } => {
                    if let Err(e) = self.events.append(run_id, "supervisor_token", json!({"text": chunk})).await {
                        tracing::warn!(run_id, error = %e, "failed to persist supervisor_token event");
                    }
                    text.push_str(&chunk);
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    order.push(call_id.clone());
                    pending.insert(call_id, PendingToolCall { tool_name });
                }
                StreamEvent::ToolCallDelta { .. } => {}
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    let tool_name = pending.remove(&call_id).map(|p| p.tool_name).unwrap_or(tool_name);
                    finished.insert(call_id.clone(), ToolCall { call_id, tool_name, arguments });
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => return Err(ChatError::Stream(message)),
            }
        }

        let tool_calls = order.into_iter().filter_map(|id| finished.remove(&id)).collect();
        Ok((text, tool_calls))
    }

    async fn run_local_tool(&self, run_id: i64, call: &ToolCall) -> ToolOutcome {
        let redacted_args = redact_args_preview(&call.arguments);
        if let Err(e) = self
            .events
            .append(
                run_id,
                "supervisor_tool_started",
                json!({"call_id": call.call_id, "tool_name": call.tool_name, "arguments": redacted_args}),
            )
            .await
        {
            tracing::warn!(run_id, error = %e, "failed to persist supervisor_tool_started event");
        }

        let outcome = match self.tools.get(&call.tool_name) {
            Some(tool) => tool.call(call.arguments.clone()).await,
            None => ToolOutcome::err(ErrorType::NotFound, format!("unknown tool: {}", call.tool_name)),
        };

        let (event_type, payload) = if outcome.is_ok() {
            ("supervisor_tool_completed", json!({"call_id": call.call_id, "tool_name": call.tool_name, "preview": preview_outcome(&outcome)}))
        } else {
            ("supervisor_tool_failed", json!({"call_id": call.call_id, "tool_name": call.tool_name, "error": preview_outcome(&outcome)}))
        };
        if let Err(e) = self.events.append(run_id, event_type, payload).await {
            tracing::warn!(run_id, error = %e, "failed to persist tool completion event");
        }

        outcome
    }

    async fn persist_tool_result(
        &self,
        thread: &Thread,
        run_id: i64,
        call_id: &str,
        outcome: &ToolOutcome,
    ) -> foreman_domain::Result<()> {
        let content = json!({
            "tool_call_id": call_id,
            "content": serde_json::to_string(outcome).unwrap_or_default(),
        });
        self.runs
            .append_message(thread.id, Some(run_id), MessageRole::Tool, content, None)
            .await?;
        Ok(())
    }

    async fn dispatch_spawn_worker(&self, run_id: i64, owner_id: &str, call: &ToolCall) -> Result<(), ToolOutcome> {
        let (runner_id, command, timeout_secs) = parse_spawn_worker_args(&call.arguments)?;
        match self
            .dispatcher
            .spawn_worker(run_id, owner_id, &call.call_id, &runner_id, &command, timeout_secs)
            .await
        {
            Ok(_) => Ok(()),
            Err(DispatcherError::RunnerNotFound(id)) => {
                Err(ToolOutcome::err(ErrorType::NotFound, format!("runner {id} not found")))
            }
            Err(DispatcherError::RunnerRevoked(id)) => {
                Err(ToolOutcome::err(ErrorType::InvalidCredentials, format!("runner {id} is revoked")))
            }
            Err(DispatcherError::Rejected(e)) => Err(ToolOutcome::err(ErrorType::ValidationError, e.to_string())),
            Err(DispatcherError::Store(e)) => Err(ToolOutcome::err(ErrorType::ExecutionError, e.to_string())),
        }
    }
}

/// Re-entry point after a dispatcher resume. Shares the private `drive`
/// loop, hence living as an inherent method rather than a free fn.
#[async_trait::async_trait]
impl foreman_dispatcher::ResumeHandle for SupervisorEngine {
    async fn resume(&self, run_id: i64, _job_id: i64) {
        self.cancel.ensure_registered(run_id);
        self.drive(run_id).await;
    }
}

/// See [`SupervisorEngine::new_cyclic`].
struct WeakResumer(std::sync::Weak<SupervisorEngine>);

#[async_trait::async_trait]
impl foreman_dispatcher::ResumeHandle for WeakResumer {
    async fn resume(&self, run_id: i64, job_id: i64) {
        match self.0.upgrade() {
            Some(engine) => foreman_dispatcher::ResumeHandle::resume(&*engine, run_id, job_id).await,
            None => tracing::warn!(run_id, job_id, "resume fired after engine was dropped"),
        }
    }
}

fn spawn_worker_definition() -> ToolDefinition {
    ToolDefinition {
        name: SPAWN_WORKER_TOOL.to_string(),
        description: "Dispatch a shell command to a registered runner and suspend until it completes.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "runner_id": {"type": "string"},
                "command": {"type": "string"},
                "timeout_secs": {"type": "integer"},
            },
            "required": ["runner_id", "command"],
        }),
    }
}

fn parse_spawn_worker_args(arguments: &Value) -> Result<(String, String, Option<u32>), ToolOutcome> {
    let runner_id = arguments
        .get("runner_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolOutcome::err(ErrorType::ValidationError, "spawn_worker requires runner_id"))?
        .to_string();
    let command = arguments
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolOutcome::err(ErrorType::ValidationError, "spawn_worker requires command"))?
        .to_string();
    let timeout_secs = arguments.get("timeout_secs").and_then(Value::as_u64).map(|v| v as u32);
    Ok((runner_id, command, timeout_secs))
}

struct PendingToolCall {
    tool_name: String,
}

const PREVIEW_CHARS: usize = 200;
const REDACTED_KEYS: &[&str] = &["token", "password", "secret", "api_key", "apikey", "authorization"];

/// Best-effort redaction of obviously sensitive argument values before
/// they go into the event log — not a substitute for tools validating
/// their own inputs.
fn redact_args_preview(arguments: &Value) -> Value {
    match arguments {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let lower = k.to_lowercase();
                if REDACTED_KEYS.iter().any(|r| lower.contains(r)) {
                    out.insert(k.clone(), json!("[redacted]"));
                } else {
                    out.insert(k.clone(), redact_args_preview(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_args_preview).collect()),
        other => other.clone(),
    }
}

fn truncate_preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(PREVIEW_CHARS).collect();
        format!("{head}…")
    }
}

fn preview_outcome(outcome: &ToolOutcome) -> String {
    match outcome {
        ToolOutcome::Ok { data } => truncate_preview(&data.to_string()),
        ToolOutcome::Err { user_message, .. } => truncate_preview(user_message),
    }
}

/// Drain an LLM stream into its final text plus the tool calls it
/// requested, mirroring the reference gateway's `tc_bufs` assembly in
/// `turn.rs` (there, over provider-specific deltas; here, over the
/// already-normalized `StreamEvent` feed). Event-free variant of
/// `SupervisorEngine::assemble_stream`, kept around for unit tests that
/// exercise the assembly logic without a running engine.
#[cfg(test)]
async fn assemble_stream(mut stream: BoxStream<'static, StreamEvent>) -> Result<(String, Vec<ToolCall>), ChatError> {
    use futures_util::StreamExt;

    let mut text = String::new();
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, PendingToolCall> = HashMap::new();
    let mut finished: HashMap<String, ToolCall> = HashMap::new();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Token { text: chunk } => text.push_str(&chunk),
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                order.push(call_id.clone());
                pending.insert(call_id, PendingToolCall { tool_name });
            }
            StreamEvent::ToolCallDelta { .. } => {
                // Arguments arrive whole in `ToolCallFinished`; deltas
                // are only a progress signal here.
            }
            StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                let tool_name = pending.remove(&call_id).map(|p| p.tool_name).unwrap_or(tool_name);
                finished.insert(call_id.clone(), ToolCall { call_id, tool_name, arguments });
            }
            StreamEvent::Done { .. } => break,
            StreamEvent::Error { message } => return Err(ChatError::Stream(message)),
        }
    }

    let tool_calls = order.into_iter().filter_map(|id| finished.remove(&id)).collect();
    Ok((text, tool_calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn fake_stream(events: Vec<StreamEvent>) -> BoxStream<'static, StreamEvent> {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn assemble_stream_collects_text_tokens() {
        let events = vec![
            StreamEvent::Token { text: "hel".into() },
            StreamEvent::Token { text: "lo".into() },
            StreamEvent::Done { usage: None, finish_reason: None },
        ];
        let (text, calls) = assemble_stream(fake_stream(events)).await.unwrap();
        assert_eq!(text, "hello");
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn assemble_stream_collects_tool_calls_in_order() {
        let events = vec![
            StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "exec".into() },
            StreamEvent::ToolCallDelta { call_id: "c1".into(), delta: "{\"x\":".into() },
            StreamEvent::ToolCallFinished {
                call_id: "c1".into(),
                tool_name: "exec".into(),
                arguments: json!({"x": 1}),
            },
            StreamEvent::Done { usage: None, finish_reason: None },
        ];
        let (_, calls) = assemble_stream(fake_stream(events)).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "exec");
    }

    #[tokio::test]
    async fn assemble_stream_propagates_error_event() {
        let events = vec![StreamEvent::Error { message: "boom".into() }];
        let result = assemble_stream(fake_stream(events)).await;
        assert!(result.is_err());
    }

    #[test]
    fn parse_spawn_worker_args_requires_runner_and_command() {
        let err = parse_spawn_worker_args(&json!({"command": "ls"})).unwrap_err();
        assert!(!err.is_ok());
    }

    #[test]
    fn parse_spawn_worker_args_reads_optional_timeout() {
        let (runner_id, command, timeout) =
            parse_spawn_worker_args(&json!({"runner_id": "r1", "command": "ls", "timeout_secs": 30})).unwrap();
        assert_eq!(runner_id, "r1");
        assert_eq!(command, "ls");
        assert_eq!(timeout, Some(30));
    }

    #[test]
    fn spawn_worker_definition_requires_runner_and_command() {
        let def = spawn_worker_definition();
        assert_eq!(def.name, SPAWN_WORKER_TOOL);
        assert_eq!(def.parameters["required"], json!(["runner_id", "command"]));
    }
}
