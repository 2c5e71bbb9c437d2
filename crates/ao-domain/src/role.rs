use serde::{Deserialize, Serialize};
use std::fmt;

/// The functional slot an LLM fills in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
    Intent,
    Planner,
    Controller,
    Executor,
    Evaluator,
}

impl LlmRole {
    pub const ALL: [LlmRole; 5] = [
        LlmRole::Intent,
        LlmRole::Planner,
        LlmRole::Controller,
        LlmRole::Executor,
        LlmRole::Evaluator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRole::Intent => "intent",
            LlmRole::Planner => "planner",
            LlmRole::Controller => "controller",
            LlmRole::Executor => "executor",
            LlmRole::Evaluator => "evaluator",
        }
    }
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
