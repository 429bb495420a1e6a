//! `GET /runners/ws` — the runner-initiated bidirectional channel.
//!
//! Flow: runner dials in, sends `hello{runner_id, token, capabilities,
//! version}` within a grace period; the gateway validates the token
//! against the runner's stored device-token hashes in constant time,
//! checks the runner isn't `revoked`, then replies `welcome` and
//! registers the connection in the [`ConnectionManager`] keyed by
//! `(owner_id, runner_id)` — displacing any prior session for that key
//! so a runner restart reconnects cleanly. `job.result`/`job.error`
//! frames complete the dispatcher's pending waiters; `heartbeat`
//! refreshes both the in-memory session and the persisted
//! `last_heartbeat_at`.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use foreman_transport::{Connection, ConnectionKey, JobOutcome, RunnerFrame};

use crate::state::AppState;

const HELLO_GRACE: Duration = Duration::from_secs(10);

pub async fn runner_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let hello = match wait_for_hello(&mut stream).await {
        Some(h) => h,
        None => {
            tracing::warn!("runner disconnected before sending hello");
            return;
        }
    };
    let RunnerFrame::Hello { runner_id, token, version, .. } = hello else {
        unreachable!("wait_for_hello only returns Hello frames");
    };

    let runner = match state.runners.get(&runner_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            tracing::warn!(runner_id = %runner_id, "hello from unregistered runner");
            return;
        }
        Err(e) => {
            tracing::error!(runner_id = %runner_id, error = %e, "failed to look up runner");
            return;
        }
    };
    if runner.revoked_at.is_some() {
        tracing::warn!(runner_id = %runner_id, "hello from revoked runner rejected");
        return;
    }

    let hashes = match state.runners.find_device_token_hashes(&runner_id).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(runner_id = %runner_id, error = %e, "failed to load device token hashes");
            return;
        }
    };
    let presented_hash = foreman_store::RunnerStore::hash_token(&token);
    let authenticated = hashes
        .iter()
        .any(|stored| bool::from(presented_hash.as_bytes().ct_eq(stored.as_bytes())));
    if !authenticated {
        tracing::warn!(runner_id = %runner_id, "hello with invalid device token rejected");
        return;
    }

    let owner_id = runner.owner_id.clone();
    let key = ConnectionKey {
        owner_id: owner_id.clone(),
        runner_id: runner_id.clone(),
    };
    let session_id = uuid::Uuid::new_v4();

    let welcome = RunnerFrame::Welcome {
        gateway_version: env!("CARGO_PKG_VERSION").to_string(),
        heartbeat_interval_secs: state.config.transport.heartbeat_interval_secs,
    };
    if send_frame(&mut sink, &welcome).await.is_err() {
        tracing::warn!(runner_id = %runner_id, "failed to send welcome");
        return;
    }

    if let Err(e) = state.runners.mark_online(&runner_id).await {
        tracing::error!(runner_id = %runner_id, error = %e, "failed to mark runner online");
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<RunnerFrame>(64);
    let displaced = state.connections.register(
        key.clone(),
        Connection {
            session_id,
            connected_at: Utc::now(),
            last_heartbeat_at: Utc::now(),
            sink: outbound_tx,
        },
    );
    if displaced.is_some() {
        tracing::info!(runner_id = %runner_id, owner_id = %owner_id, "displaced previous connection on reconnect");
        let displaced_count = state.dispatch.fail_all_for_connection(&key);
        if displaced_count > 0 {
            tracing::warn!(runner_id = %runner_id, displaced_count, "failed pending jobs orphaned by reconnect");
        }
    }

    tracing::info!(runner_id = %runner_id, owner_id = %owner_id, version = %version, "runner connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if send_frame(&mut sink, &frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match RunnerFrame::decode(&text) {
                Ok(RunnerFrame::Heartbeat { sent_at_ms }) => {
                    state.connections.touch(&key);
                    if let Err(e) = state.runners.touch_heartbeat(&runner_id).await {
                        tracing::warn!(runner_id = %runner_id, error = %e, "failed to persist heartbeat");
                    }
                    if let Some(sink) = state.connections.sink(&key) {
                        let _ = sink.send(RunnerFrame::HeartbeatAck { sent_at_ms }).await;
                    }
                }
                Ok(RunnerFrame::HeartbeatAck { .. }) => {
                    state.connections.touch(&key);
                }
                Ok(RunnerFrame::JobResult { job_id, exit_code, stdout, stderr, duration_ms }) => {
                    state.connections.touch(&key);
                    state.dispatch.complete(
                        job_id,
                        JobOutcome::Success { exit_code, stdout, stderr, duration_ms },
                    );
                }
                Ok(RunnerFrame::JobError { job_id, message, critical }) => {
                    state.connections.touch(&key);
                    state.dispatch.complete(job_id, JobOutcome::Error { message, critical });
                }
                Ok(other) => {
                    tracing::debug!(runner_id = %runner_id, ?other, "ignoring frame not expected from a runner");
                }
                Err(e) => {
                    tracing::debug!(runner_id = %runner_id, error = %e, "failed to decode frame");
                }
            },
            Message::Close(_) => {
                tracing::info!(runner_id = %runner_id, "runner closed connection");
                break;
            }
            _ => {}
        }
    }

    writer.abort();
    let still_current = state.connections.remove_if_current(&key, session_id);
    if still_current {
        let failed = state.dispatch.fail_all_for_connection(&key);
        if let Err(e) = state.runners.mark_offline(&runner_id).await {
            tracing::error!(runner_id = %runner_id, error = %e, "failed to mark runner offline");
        }
        tracing::info!(runner_id = %runner_id, failed_in_flight = failed, "runner disconnected");
    }
}

async fn wait_for_hello(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<RunnerFrame> {
    tokio::time::timeout(HELLO_GRACE, async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(frame @ RunnerFrame::Hello { .. }) = RunnerFrame::decode(&text) {
                    return Some(frame);
                }
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &RunnerFrame,
) -> Result<(), ()> {
    let text = frame.encode().map_err(|_| ())?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
