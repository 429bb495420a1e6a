use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Default timeout for a `spawn_worker` job when the caller
    /// doesn't specify one.
    #[serde(default = "d_job_timeout_secs")]
    pub default_job_timeout_secs: u32,
    /// Job output longer than this is summarized before being folded
    /// back into the conversation, rather than pasted verbatim.
    #[serde(default = "d_summarize_threshold_chars")]
    pub summarize_threshold_chars: usize,
    /// When summarization itself is unavailable, output is instead
    /// truncated to this many characters with a marker appended.
    #[serde(default = "d_truncate_chars")]
    pub truncate_fallback_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_job_timeout_secs: d_job_timeout_secs(),
            summarize_threshold_chars: d_summarize_threshold_chars(),
            truncate_fallback_chars: d_truncate_chars(),
        }
    }
}

fn d_job_timeout_secs() -> u32 {
    300
}
fn d_summarize_threshold_chars() -> usize {
    2000
}
fn d_truncate_chars() -> usize {
    150
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_thresholds() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.summarize_threshold_chars, 2000);
        assert_eq!(cfg.truncate_fallback_chars, 150);
    }
}
