use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream Assembler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Bound on a live subscriber's token-event backlog before the
    /// oldest tokens are dropped. Non-token events are never dropped.
    #[serde(default = "d_token_backlog")]
    pub token_backlog_capacity: usize,
    /// Hard ceiling on a `keep_open` lease's `ttl_ms`, regardless of
    /// what the emitter requested.
    #[serde(default = "d_keep_open_ttl_cap_ms")]
    pub keep_open_ttl_cap_ms: u64,
    /// Whether `supervisor_token` events are included when replaying
    /// history on reconnect. They are always retained in storage for
    /// debugging; this only controls replay.
    #[serde(default = "d_replay_tokens")]
    pub replay_tokens: bool,
    /// A run with no `stream_control` events at all falls back to
    /// closing the stream once the run reaches a terminal status and
    /// the client has caught up — legacy heuristic support only.
    #[serde(default = "d_heuristic_close_fallback")]
    pub heuristic_close_fallback: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            token_backlog_capacity: d_token_backlog(),
            keep_open_ttl_cap_ms: d_keep_open_ttl_cap_ms(),
            replay_tokens: d_replay_tokens(),
            heuristic_close_fallback: d_heuristic_close_fallback(),
        }
    }
}

fn d_token_backlog() -> usize {
    256
}
fn d_keep_open_ttl_cap_ms() -> u64 {
    300_000
}
fn d_replay_tokens() -> bool {
    false
}
fn d_heuristic_close_fallback() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keep_open_ttl_cap_is_five_minutes() {
        assert_eq!(StreamConfig::default().keep_open_ttl_cap_ms, 300_000);
    }

    #[test]
    fn default_excludes_tokens_from_replay() {
        assert!(!StreamConfig::default().replay_tokens);
    }
}
