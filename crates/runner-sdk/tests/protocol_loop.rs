//! Integration test: boots an in-process WebSocket server that simulates
//! the gateway side of the runner protocol, connects a real
//! [`RunnerClient`], and asserts the full handshake + job dispatch cycle.
//!
//! This single test covers the bulk of future regressions in the
//! protocol loop:
//! - `Hello` is sent with the right runner_id/token/capabilities
//! - `Welcome` is received and the handshake completes
//! - `JobRequest` dispatches to the `CommandExecutor` and a `JobResult`
//!   comes back with the right exit code / stdout
//! - A command that exits non-zero still reports via `JobResult`, not
//!   as a transport-level error
//! - `Heartbeat` from the gateway gets a `HeartbeatAck` back

use std::net::SocketAddr;
use std::time::Duration;

use foreman_domain::capability::Capability;
use foreman_runner_sdk::{CommandExecutor, ExecOutcome, ReconnectBackoff, RunnerClientBuilder, RunnerFrame};
use foreman_transport::RunnerFrame as WireFrame;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

struct EchoExecutor;

#[async_trait::async_trait]
impl CommandExecutor for EchoExecutor {
    async fn execute(&self, command: &str, _timeout_secs: u32) -> ExecOutcome {
        if command == "exit-nonzero" {
            return ExecOutcome::Finished {
                exit_code: 3,
                stdout: String::new(),
                stderr: "boom".into(),
                duration_ms: 1,
            };
        }
        ExecOutcome::Finished {
            exit_code: 0,
            stdout: format!("ran: {command}"),
            stderr: String::new(),
            duration_ms: 1,
        }
    }
}

/// A captured `Hello` from the connected runner.
#[derive(Debug, Clone)]
struct CapturedHello {
    runner_id: String,
    capabilities: Vec<Capability>,
}

/// Handle to interact with a connected runner from the test.
struct GatewayConn {
    send: mpsc::Sender<WireFrame>,
    recv: mpsc::Receiver<WireFrame>,
}

impl GatewayConn {
    async fn request_job(&mut self, job_id: &str, command: &str) -> WireFrame {
        let req = WireFrame::JobRequest {
            job_id: job_id.into(),
            command: command.into(),
            timeout_secs: 5,
        };
        self.send.send(req).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.recv.recv()).await {
                Ok(Some(msg @ WireFrame::JobResult { .. })) => return msg,
                Ok(Some(msg @ WireFrame::JobError { .. })) => return msg,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("connection dropped before job result"),
                Err(_) => panic!("timeout waiting for job result"),
            }
        }
    }
}

/// Boots a tiny WS server on an ephemeral port, simulating the gateway
/// side of the runner protocol.
async fn start_mini_gateway() -> (SocketAddr, mpsc::Receiver<(CapturedHello, GatewayConn)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                let hello = loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(WireFrame::Hello { runner_id, capabilities, .. }) =
                                WireFrame::decode(&text)
                            {
                                break CapturedHello { runner_id, capabilities };
                            }
                        }
                        _ => return,
                    }
                };

                let welcome = WireFrame::Welcome {
                    gateway_version: "0.0.0-test".into(),
                    heartbeat_interval_secs: 60,
                };
                if sink.send(Message::Text(welcome.encode().unwrap())).await.is_err() {
                    return;
                }

                let (msg_tx, mut msg_rx) = mpsc::channel::<WireFrame>(16);
                let (resp_tx, resp_rx) = mpsc::channel::<WireFrame>(16);

                let conn = GatewayConn { send: msg_tx, recv: resp_rx };
                let _ = conn_tx.send((hello, conn)).await;

                let resp_tx_clone = resp_tx.clone();
                let read_task = tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(frame) = WireFrame::decode(&text) {
                                let _ = resp_tx_clone.send(frame).await;
                            }
                        }
                    }
                });

                let write_task = tokio::spawn(async move {
                    while let Some(frame) = msg_rx.recv().await {
                        let json = frame.encode().unwrap();
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                });

                let _ = tokio::join!(read_task, write_task);
            });
        }
    });

    (addr, conn_rx)
}

#[tokio::test]
async fn handshake_and_job_roundtrip() {
    let (addr, mut conn_rx) = start_mini_gateway().await;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    let client = RunnerClientBuilder::new()
        .gateway_ws_url(format!("ws://{addr}/"))
        .runner_id("integration-runner")
        .token("test-token")
        .capability(Capability::ExecReadonly)
        .heartbeat_interval(Duration::from_secs(60))
        .max_concurrent_jobs(4)
        .reconnect_backoff(ReconnectBackoff { max_attempts: 1, ..Default::default() })
        .build()
        .unwrap();

    let handle = client.spawn(EchoExecutor, shutdown_clone);

    let (hello, mut conn) = tokio::time::timeout(Duration::from_secs(5), conn_rx.recv())
        .await
        .expect("timeout waiting for runner connection")
        .expect("no connection received");

    assert_eq!(hello.runner_id, "integration-runner");
    assert!(hello.capabilities.contains(&Capability::ExecReadonly));

    let resp = conn.request_job("job-1", "echo hi").await;
    match resp {
        RunnerFrame::JobResult { job_id, exit_code, stdout, .. } => {
            assert_eq!(job_id, "job-1");
            assert_eq!(exit_code, 0);
            assert_eq!(stdout, "ran: echo hi");
        }
        other => panic!("expected JobResult, got: {other:?}"),
    }

    let resp = conn.request_job("job-2", "exit-nonzero").await;
    match resp {
        RunnerFrame::JobResult { job_id, exit_code, stderr, .. } => {
            assert_eq!(job_id, "job-2");
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "boom");
        }
        other => panic!("expected JobResult, got: {other:?}"),
    }

    conn.send.send(WireFrame::Heartbeat { sent_at_ms: 0 }).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, conn.recv.recv()).await {
            Ok(Some(RunnerFrame::HeartbeatAck { .. })) => break,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("connection dropped before heartbeat_ack"),
            Err(_) => panic!("timeout waiting for heartbeat_ack"),
        }
    }

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}
