use serde::{Deserialize, Serialize};

/// Tuning for the planner/controller/evaluator state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of prior turns kept in the LLM context window.
    #[serde(default = "d_memory_window")]
    pub memory_window: usize,
    /// Retries allowed per plan step beyond the first attempt. A step runs
    /// at most `max_step_retries + 1` controller-executor-evaluator cycles.
    #[serde(default = "d_max_step_retries")]
    pub max_step_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            memory_window: d_memory_window(),
            max_step_retries: d_max_step_retries(),
        }
    }
}

fn d_memory_window() -> usize {
    20
}
fn d_max_step_retries() -> u32 {
    1
}
