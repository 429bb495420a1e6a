//! Wire protocol between the gateway and a runner's WebSocket connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use foreman_domain::capability::Capability;

/// Hard cap on a single frame. Frames over this size are rejected and
/// the connection is closed — see `TransportConfig::max_frame_bytes`
/// for the configurable knob; this is the wire-level ceiling it's
/// validated against.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Frames exchanged on the runner WebSocket, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunnerFrame {
    /// Runner → Gateway: initial handshake. `token` is the device
    /// token's plaintext, compared in constant time against the
    /// stored hash.
    #[serde(rename = "hello")]
    Hello {
        runner_id: String,
        token: String,
        capabilities: Vec<Capability>,
        version: String,
    },

    /// Gateway → Runner: handshake accepted.
    #[serde(rename = "welcome")]
    Welcome {
        gateway_version: String,
        heartbeat_interval_secs: u64,
    },

    /// Bidirectional: keep-alive.
    #[serde(rename = "heartbeat")]
    Heartbeat { sent_at_ms: i64 },

    /// Bidirectional: heartbeat response.
    #[serde(rename = "heartbeat_ack")]
    HeartbeatAck { sent_at_ms: i64 },

    /// Gateway → Runner: run this command as a worker job.
    #[serde(rename = "job.request")]
    JobRequest {
        job_id: i64,
        command: String,
        timeout_secs: u32,
    },

    /// Runner → Gateway: job finished (whether exit code was zero or
    /// not — a non-zero exit code is not itself an error).
    #[serde(rename = "job.result")]
    JobResult {
        job_id: i64,
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },

    /// Runner → Gateway: the job could not be executed at all (denied
    /// by the runner's own policy, spawn failure, etc.), distinct from
    /// a completed-but-failing command. `critical` short-circuits the
    /// dispatcher's timeout wait rather than making it wait out the
    /// full `timeout_secs`.
    #[serde(rename = "job.error")]
    JobError {
        job_id: i64,
        message: String,
        #[serde(default)]
        critical: bool,
    },
}

impl RunnerFrame {
    /// Encode to the JSON text sent over the wire, refusing frames
    /// over `MAX_FRAME_BYTES`.
    pub fn encode(&self) -> Result<String, foreman_domain::Error> {
        let json = serde_json::to_string(self)?;
        if json.len() > MAX_FRAME_BYTES {
            return Err(foreman_domain::Error::Transport(format!(
                "frame of {} bytes exceeds MAX_FRAME_BYTES ({})",
                json.len(),
                MAX_FRAME_BYTES
            )));
        }
        Ok(json)
    }

    /// Decode from wire text, rejecting oversized input before
    /// attempting to parse it.
    pub fn decode(text: &str) -> Result<Self, foreman_domain::Error> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(foreman_domain::Error::Transport(format!(
                "frame of {} bytes exceeds MAX_FRAME_BYTES ({})",
                text.len(),
                MAX_FRAME_BYTES
            )));
        }
        serde_json::from_str(text).map_err(foreman_domain::Error::Json)
    }
}

/// Untyped envelope used only to peek at `job_id` from a result/error
/// frame without fully decoding it — not sent over the wire.
#[derive(Debug, Deserialize)]
pub struct JobIdPeek {
    #[serde(default)]
    pub job_id: Option<i64>,
}

pub fn peek_job_id(raw: &Value) -> Option<i64> {
    raw.get("job_id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrips() {
        let frame = RunnerFrame::Hello {
            runner_id: "r1".into(),
            token: "secret".into(),
            capabilities: vec![Capability::ExecReadonly],
            version: "0.1.0".into(),
        };
        let encoded = frame.encode().unwrap();
        let decoded = RunnerFrame::decode(&encoded).unwrap();
        match decoded {
            RunnerFrame::Hello { runner_id, .. } => assert_eq!(runner_id, "r1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn job_error_critical_defaults_false() {
        let json = r#"{"type":"job.error","job_id":1,"message":"boom"}"#;
        let decoded = RunnerFrame::decode(json).unwrap();
        match decoded {
            RunnerFrame::JobError { critical, .. } => assert!(!critical),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let huge = "x".repeat(MAX_FRAME_BYTES + 1);
        let err = RunnerFrame::decode(&huge);
        assert!(err.is_err());
    }
}
