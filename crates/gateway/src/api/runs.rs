//! Run lifecycle endpoints.
//!
//! - `POST /run`                    — create a thread (or reuse one) and start a supervisor run
//! - `POST /run/:id/cancel`         — cooperative cancellation
//! - `GET /stream/runs/:id`         — SSE replay + live tail of run events
//! - `GET /healthz`                 — liveness probe

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::StreamExt;
use serde::Deserialize;
use serde_json::json;

use foreman_domain::entities::MessageRole;

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub task: String,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
}

pub async fn create_run(State(state): State<AppState>, Json(req): Json<CreateRunRequest>) -> impl IntoResponse {
    if req.task.trim().is_empty() {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "error": "task must not be empty" })),
        )
            .into_response();
    }

    let (thread_id, owner_id) = match req.thread_id {
        Some(id) => match state.runs.get_thread(id).await {
            Ok(Some(thread)) => (thread.id, thread.owner_id),
            Ok(None) => {
                return (
                    axum::http::StatusCode::NOT_FOUND,
                    Json(json!({ "error": "thread not found" })),
                )
                    .into_response()
            }
            Err(e) => return internal_error(e),
        },
        None => {
            let owner_id = req.owner_id.clone().unwrap_or_else(|| "default".to_string());
            match state.runs.create_thread(&owner_id, None).await {
                Ok(thread) => (thread.id, owner_id),
                Err(e) => return internal_error(e),
            }
        }
    };

    // `context`/`preferences` ride along with the task text rather than
    // a separate channel — the supervisor only ever sees plain messages.
    let task_text = match &req.context {
        Some(ctx) => format!("{}\n\ncontext: {ctx}", req.task),
        None => req.task.clone(),
    };
    if let Err(e) = state
        .runs
        .append_message(thread_id, None, MessageRole::User, json!(task_text), None)
        .await
    {
        return internal_error(e);
    }
    let _ = req.preferences;

    let run = match state.engine.start_run(thread_id, &owner_id).await {
        Ok(run) => run,
        Err(e) => return internal_error(e),
    };

    Json(json!({
        "run_id": run.id,
        "thread_id": run.thread_id,
        "status": run.status,
        "stream_url": format!("/stream/runs/{}", run.id),
    }))
    .into_response()
}

pub async fn cancel_run(State(state): State<AppState>, Path(run_id): Path<i64>) -> impl IntoResponse {
    let cancelled = state.engine.cancel_run(run_id);
    let run = state.runs.get_run(run_id).await;
    match run {
        Ok(Some(run)) => Json(json!({
            "run_id": run.id,
            "status": run.status,
            "message": if cancelled { "cancellation requested" } else { "run already terminal or not found" },
        }))
        .into_response(),
        Ok(None) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "run not found" })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub last_event_id: i64,
    #[serde(default)]
    pub include_tokens: bool,
}

pub async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
    Query(q): Query<StreamQuery>,
) -> impl IntoResponse {
    match state.runs.get_run(run_id).await {
        Ok(None) => {
            return (
                axum::http::StatusCode::NOT_FOUND,
                Json(json!({ "error": "run not found" })),
            )
                .into_response()
        }
        Err(e) => return internal_error(e),
        Ok(Some(_)) => {}
    }

    let include_tokens = q.include_tokens || state.config.stream.replay_tokens;
    let inner = state.stream.stream(run_id, q.last_event_id, include_tokens);

    let sse_stream = inner.map(|item| match item {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, std::convert::Infallible>(
                Event::default()
                    .id(event.id.to_string())
                    .event(event.event_type.clone())
                    .data(data),
            )
        }
        Err(e) => Ok(Event::default().event("error").data(json!({ "error": e.to_string() }).to_string())),
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response()
}

fn internal_error(e: foreman_domain::Error) -> axum::response::Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}
