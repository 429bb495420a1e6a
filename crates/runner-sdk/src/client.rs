//! Core runner client — manages the WebSocket lifecycle, heartbeat, and
//! job dispatch via a [`CommandExecutor`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foreman_domain::capability::Capability;
use foreman_transport::RunnerFrame;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::executor::CommandExecutor;
use crate::reconnect::ReconnectBackoff;
use crate::types::{ExecOutcome, RunnerSdkError};

/// A fully-configured runner client ready to connect to the gateway.
///
/// Create via [`RunnerClientBuilder`](crate::builder::RunnerClientBuilder).
pub struct RunnerClient {
    pub(crate) gateway_ws_url: String,
    pub(crate) runner_id: String,
    pub(crate) token: String,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) version: String,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) max_concurrent_jobs: usize,
}

impl RunnerClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::RunnerClientBuilder {
        crate::builder::RunnerClientBuilder::new()
    }

    /// Run the runner client. Connects to the gateway, performs the
    /// `hello`/`welcome` handshake, and enters the job loop. On
    /// disconnection, automatically reconnects according to the
    /// [`ReconnectBackoff`] policy.
    ///
    /// Returns only on fatal error, `max_attempts` exhaustion, or when
    /// the `shutdown` token is cancelled.
    pub async fn run(
        self,
        executor: impl CommandExecutor,
        shutdown: CancellationToken,
    ) -> Result<(), RunnerSdkError> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(executor);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(RunnerSdkError::Shutdown);
            }

            let result = tokio::select! {
                r = self.connect_and_run(&executor) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!(runner_id = %self.runner_id, "shutdown requested");
                    return Err(RunnerSdkError::Shutdown);
                }
            };

            match result {
                Ok(handshake_completed) => {
                    tracing::info!(
                        runner_id = %self.runner_id,
                        handshake_completed,
                        "connection closed gracefully"
                    );
                    // Only reset backoff after a successful handshake
                    // (welcome received), not merely after TCP connect.
                    if handshake_completed {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    tracing::warn!(runner_id = %self.runner_id, attempt, error = %e, "connection lost");
                }
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                tracing::error!(runner_id = %self.runner_id, attempts = attempt, "max reconnect attempts exhausted");
                return Err(RunnerSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(
                runner_id = %self.runner_id,
                delay_ms = delay.as_millis() as u64,
                attempt = attempt + 1,
                "reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(RunnerSdkError::Shutdown),
            }

            attempt += 1;
        }
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle` for
    /// embedding in another runtime.
    pub fn spawn(
        self,
        executor: impl CommandExecutor,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), RunnerSdkError>> {
        tokio::spawn(async move { self.run(executor, shutdown).await })
    }

    /// Single connection lifecycle: connect -> handshake -> job loop.
    ///
    /// Returns `Ok(true)` if the handshake completed (`welcome`
    /// received) before the connection closed, `Ok(false)` if it closed
    /// before handshake.
    async fn connect_and_run(&self, executor: &Arc<dyn CommandExecutor>) -> Result<bool, anyhow::Error> {
        tracing::info!(url = %self.gateway_ws_url, runner_id = %self.runner_id, "connecting to gateway");

        let (ws, _response) = tokio_tungstenite::connect_async(&self.gateway_ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        let hello = RunnerFrame::Hello {
            runner_id: self.runner_id.clone(),
            token: self.token.clone(),
            capabilities: self.capabilities.clone(),
            version: self.version.clone(),
        };
        sink.send(Message::Text(hello.encode()?)).await?;

        let welcome_timeout = Duration::from_secs(10);
        let (gateway_version, heartbeat_interval_secs) = tokio::time::timeout(welcome_timeout, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Ok(RunnerFrame::Welcome { gateway_version, heartbeat_interval_secs }) =
                        RunnerFrame::decode(&text)
                    {
                        return Ok((gateway_version, heartbeat_interval_secs));
                    }
                }
            }
            Err(anyhow::anyhow!("connection closed before welcome"))
        })
        .await
        .map_err(|_| anyhow::anyhow!("welcome timeout"))??;

        tracing::info!(
            gateway_version = %gateway_version,
            runner_id = %self.runner_id,
            "gateway welcomed us"
        );

        let ws = sink
            .reunite(stream)
            .map_err(|e| anyhow::anyhow!("failed to reunite WebSocket halves: {e}"))?;
        let (mut sink, mut stream) = ws.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<RunnerFrame>(64);
        let job_semaphore = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let inflight_cancel = CancellationToken::new();

        let heartbeat_interval = if heartbeat_interval_secs > 0 {
            Duration::from_secs(heartbeat_interval_secs)
        } else {
            self.heartbeat_interval
        };
        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            loop {
                interval.tick().await;
                let frame = RunnerFrame::Heartbeat { sent_at_ms: Utc::now().timestamp_millis() };
                if heartbeat_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match frame.encode() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(ref text) => match RunnerFrame::decode(text) {
                    Ok(RunnerFrame::JobRequest { job_id, command, timeout_secs }) => {
                        tracing::debug!(job_id, "received job.request");
                        let executor = Arc::clone(executor);
                        let tx = outbound_tx.clone();
                        let sem = Arc::clone(&job_semaphore);
                        let job_cancel = inflight_cancel.child_token();

                        tokio::spawn(async move {
                            let _permit = sem.acquire().await;
                            if job_cancel.is_cancelled() {
                                return;
                            }
                            let outcome = executor.execute(&command, timeout_secs).await;
                            let frame = match outcome {
                                ExecOutcome::Finished { exit_code, stdout, stderr, duration_ms } => {
                                    RunnerFrame::JobResult { job_id, exit_code, stdout, stderr, duration_ms }
                                }
                                ExecOutcome::Error { message, critical } => {
                                    RunnerFrame::JobError { job_id, message, critical }
                                }
                            };
                            let _ = tx.send(frame).await;
                        });
                    }
                    Ok(RunnerFrame::Heartbeat { sent_at_ms }) => {
                        let _ = outbound_tx.send(RunnerFrame::HeartbeatAck { sent_at_ms }).await;
                    }
                    Ok(RunnerFrame::HeartbeatAck { .. }) => {
                        tracing::trace!("received heartbeat_ack");
                    }
                    Ok(other) => {
                        tracing::debug!(?other, "ignoring frame not expected from gateway");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "failed to decode frame");
                    }
                },
                Message::Close(_) => {
                    tracing::info!("gateway closed connection");
                    break;
                }
                _ => {}
            }
        }

        inflight_cancel.cancel();
        heartbeat_task.abort();
        writer_task.abort();

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ShellExecutor;

    fn test_client() -> RunnerClient {
        RunnerClient {
            gateway_ws_url: "ws://localhost:3210/v1/runners/ws".into(),
            runner_id: "test-runner".into(),
            token: "secret".into(),
            capabilities: vec![Capability::ExecReadonly],
            version: "0.1.0".into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_jobs: 4,
        }
    }

    #[tokio::test]
    async fn connect_and_run_fails_fast_against_unreachable_gateway() {
        let client = RunnerClient { gateway_ws_url: "ws://127.0.0.1:1/nope".into(), ..test_client() };
        let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor);
        let result = client.connect_and_run(&executor).await;
        assert!(result.is_err());
    }
}
