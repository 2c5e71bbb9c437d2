use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tool timeout and output-size limits. Keyed by tool name; a tool with
/// no entry falls back to `default_timeout_secs` / `default_output_cap_chars`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "d_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "d_output_cap")]
    pub default_output_cap_chars: usize,
    #[serde(default)]
    pub overrides: HashMap<String, ToolLimits>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: d_timeout_secs(),
            default_output_cap_chars: d_output_cap(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLimits {
    pub timeout_secs: u64,
    pub output_cap_chars: usize,
}

impl ToolsConfig {
    pub fn timeout_for(&self, tool_name: &str) -> u64 {
        self.overrides
            .get(tool_name)
            .map(|l| l.timeout_secs)
            .unwrap_or(self.default_timeout_secs)
    }

    pub fn output_cap_for(&self, tool_name: &str) -> usize {
        self.overrides
            .get(tool_name)
            .map(|l| l.output_cap_chars)
            .unwrap_or(self.default_output_cap_chars)
    }
}

fn d_timeout_secs() -> u64 {
    120
}
fn d_output_cap() -> usize {
    20_000
}
