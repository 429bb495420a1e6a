//! Core types for command execution: the outcome a runner reports back
//! and the SDK's own error surface.

/// What running a dispatched command produced. Mirrors the two
/// `RunnerFrame` variants a runner is allowed to send back for a job
/// (`JobResult` / `JobError`) without committing executor authors to
/// the wire shape directly.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Finished {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },
    Error {
        message: String,
        critical: bool,
    },
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum RunnerSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
