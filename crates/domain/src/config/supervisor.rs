use serde::{Deserialize, Serialize};

use super::CompactionConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Hard cap on ReAct steps within a single run, independent of how
    /// many times it suspends and resumes across worker jobs.
    #[serde(default = "d_step_ceiling")]
    pub step_ceiling: u32,
    #[serde(default)]
    pub compaction: CompactionConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            step_ceiling: d_step_ceiling(),
            compaction: CompactionConfig::default(),
        }
    }
}

fn d_step_ceiling() -> u32 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_step_ceiling_is_two_hundred() {
        assert_eq!(SupervisorConfig::default().step_ceiling, 200);
    }
}
