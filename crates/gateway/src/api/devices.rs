//! Device/runner token lifecycle.
//!
//! - `POST /devices/tokens`    — register (or reuse) a runner and mint
//!   a fresh device token; the plaintext is returned exactly once.
//! - `GET /devices/tokens`     — list a runner's token metadata (never
//!   the hash or plaintext).
//! - `DELETE /devices/tokens/:id` — revoke a single token.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use foreman_domain::capability::Capability;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub runner_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    id: Uuid,
    runner_id: String,
    owner_id: String,
    token: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create_token(State(state): State<AppState>, Json(req): Json<CreateTokenRequest>) -> impl IntoResponse {
    if req.runner_id.trim().is_empty() {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "error": "runner_id must not be empty" })),
        )
            .into_response();
    }

    let owner_id = req.owner_id.clone().unwrap_or_else(|| "default".to_string());

    let runner = match state.runners.get(&req.runner_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            let name = req.name.clone().unwrap_or_else(|| req.runner_id.clone());
            match state
                .runners
                .register(&req.runner_id, &owner_id, &name, &req.capabilities)
                .await
            {
                Ok(r) => r,
                Err(e) => return internal_error(e),
            }
        }
        Err(e) => return internal_error(e),
    };

    if runner.owner_id != owner_id {
        // Same 404-as-"doesn't exist" rule used everywhere else: a
        // cross-owner token mint must not confirm the runner exists.
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "runner not found" })),
        )
            .into_response();
    }

    match state.runners.create_device_token(&runner.id, &owner_id).await {
        Ok((device_token, plaintext)) => Json(TokenResponse {
            id: device_token.id,
            runner_id: device_token.runner_id,
            owner_id: device_token.owner_id,
            token: plaintext,
            created_at: device_token.created_at,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTokensQuery {
    pub runner_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenMeta {
    id: Uuid,
    runner_id: String,
    owner_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn list_tokens(State(state): State<AppState>, Query(q): Query<ListTokensQuery>) -> impl IntoResponse {
    let owner_id = q.owner_id.unwrap_or_else(|| "default".to_string());
    match state.runners.get(&q.runner_id).await {
        Ok(Some(r)) if r.owner_id == owner_id => {}
        Ok(_) => {
            return (
                axum::http::StatusCode::NOT_FOUND,
                Json(json!({ "error": "runner not found" })),
            )
                .into_response()
        }
        Err(e) => return internal_error(e),
    }

    match state.runners.list_device_tokens(&q.runner_id).await {
        Ok(tokens) => Json(
            tokens
                .into_iter()
                .map(|t| TokenMeta {
                    id: t.id,
                    runner_id: t.runner_id,
                    owner_id: t.owner_id,
                    created_at: t.created_at,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn revoke_token(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.runners.revoke_device_token(id).await {
        Ok(()) => Json(json!({ "id": id, "revoked": true })).into_response(),
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: foreman_domain::Error) -> axum::response::Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}
