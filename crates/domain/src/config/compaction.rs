use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction collapses old thread messages into a summary message so
/// the context window doesn't overflow across a long-running run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Enable automatic compaction when the estimated context budget
    /// is exceeded.
    #[serde(default = "d_true")]
    pub auto: bool,
    /// Token budget threshold that triggers compaction.
    #[serde(default = "d_context_budget")]
    pub context_budget_tokens: u32,
    /// Number of most recent messages to keep verbatim after compaction.
    #[serde(default = "d_12")]
    pub keep_last_messages: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            auto: true,
            context_budget_tokens: d_context_budget(),
            keep_last_messages: 12,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_context_budget() -> u32 {
    100_000
}
fn d_12() -> usize {
    12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = CompactionConfig::default();
        assert!(cfg.auto);
        assert_eq!(cfg.keep_last_messages, 12);
        assert!(cfg.context_budget_tokens > 0);
    }
}
