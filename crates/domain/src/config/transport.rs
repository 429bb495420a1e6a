use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Hard cap on a single WebSocket frame. Frames over this size are
    /// rejected and the connection is closed.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "d_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// A runner that misses this many consecutive heartbeats is marked
    /// offline and its connection is dropped.
    #[serde(default = "d_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: d_max_frame_bytes(),
            heartbeat_interval_secs: d_heartbeat_interval_secs(),
            heartbeat_timeout_secs: d_heartbeat_timeout_secs(),
        }
    }
}

fn d_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}
fn d_heartbeat_interval_secs() -> u64 {
    20
}
fn d_heartbeat_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_frame_is_four_mib() {
        assert_eq!(TransportConfig::default().max_frame_bytes, 4 * 1024 * 1024);
    }
}
