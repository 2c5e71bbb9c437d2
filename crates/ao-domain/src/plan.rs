use serde::{Deserialize, Serialize};

/// Input to the controller: one step of a confirmed plan.
///
/// Invariant: step ids in a plan are dense and ordered starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_id: u32,
    pub description: String,
    #[serde(default)]
    pub tool_hint: Option<String>,
    #[serde(default)]
    pub input_hint: Option<String>,
    pub expected_outcome: String,
}

impl PlanStep {
    /// Build a retry-shaped copy of this step: `tool_hint` / `input_hint`
    /// are replaced with the previous step-evaluator's suggestions.
    pub fn as_retry(&self, suggested_tool: Option<String>, suggested_input: Option<String>) -> Self {
        Self {
            step_id: self.step_id,
            description: self.description.clone(),
            tool_hint: suggested_tool,
            input_hint: suggested_input,
            expected_outcome: self.expected_outcome.clone(),
        }
    }
}

/// Output of a planner: a human-readable summary plus the structured steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutline {
    pub human_summary: String,
    pub steps: Vec<PlanStep>,
}

/// Output of the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Plan,
    DirectQa,
}

/// Output of the controller: which tool (if any) to invoke for a step.
///
/// Invariant: `tool_input` is `Some` iff `tool_name` is `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerDecision {
    pub tool_name: Option<String>,
    pub tool_input: Option<serde_json::Value>,
    pub reasoning: String,
    pub confidence: f32,
}

impl ControllerDecision {
    pub fn no_tool(reasoning: impl Into<String>, confidence: f32) -> Self {
        Self {
            tool_name: None,
            tool_input: None,
            reasoning: reasoning.into(),
            confidence,
        }
    }

    /// A decision is internally consistent when `tool_input` is present
    /// exactly when `tool_name` is.
    pub fn is_consistent(&self) -> bool {
        self.tool_name.is_some() == self.tool_input.is_some()
    }
}

/// Terminal status of a single attempt or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// ` ` — not yet attempted.
    Pending,
    /// `x` — success.
    Success,
    /// `!` — failed.
    Failed,
    /// `-` — cancelled.
    Cancelled,
}

impl AttemptStatus {
    pub fn checkbox_char(&self) -> char {
        match self {
            AttemptStatus::Pending => ' ',
            AttemptStatus::Success => 'x',
            AttemptStatus::Failed => '!',
            AttemptStatus::Cancelled => '-',
        }
    }
}

/// One controller -> executor -> step-evaluator cycle for a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttempt {
    pub attempt_number: u32,
    pub controller_decision: ControllerDecision,
    pub executor_input_prompt: String,
    pub executor_output: Option<String>,
    pub error: Option<String>,
    pub evaluator_verdict: Option<EvaluationOutcome>,
    pub status: AttemptStatus,
}

/// All attempts made for a single plan step, plus its derived final status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    pub step_id: u32,
    pub attempts: Vec<StepAttempt>,
    pub final_status: AttemptStatus,
}

impl StepTrace {
    pub fn new(step_id: u32) -> Self {
        Self {
            step_id,
            attempts: Vec::new(),
            final_status: AttemptStatus::Pending,
        }
    }
}

/// The full trace of a plan's execution.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanTrace {
    pub steps: Vec<StepTrace>,
    pub final_status: Option<AttemptStatus>,
}

/// Per-step evaluator verdict: did the attempt achieve the step's goal, and
/// if not, is it worth retrying?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub achieved_goal: bool,
    pub assessment: String,
    pub is_recoverable_via_retry: bool,
    pub suggested_new_tool_for_retry: Option<String>,
    pub suggested_new_input_instructions_for_retry: Option<String>,
    pub confidence: f32,
}

/// Overall-plan evaluator verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallEvaluation {
    pub overall_success: bool,
    pub assessment: String,
    pub missing_information: Option<Vec<String>>,
    pub suggestions_for_replan: Option<Vec<String>>,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_decision_consistency() {
        let d = ControllerDecision::no_tool("reasoning-only step", 0.9);
        assert!(d.is_consistent());

        let d = ControllerDecision {
            tool_name: Some("search".into()),
            tool_input: Some(serde_json::json!({"q": "x"})),
            reasoning: "use search".into(),
            confidence: 0.8,
        };
        assert!(d.is_consistent());

        let d = ControllerDecision {
            tool_name: Some("search".into()),
            tool_input: None,
            reasoning: "bad".into(),
            confidence: 0.5,
        };
        assert!(!d.is_consistent());
    }

    #[test]
    fn retry_step_replaces_hints_only() {
        let step = PlanStep {
            step_id: 2,
            description: "Write the report".into(),
            tool_hint: Some("write_file".into()),
            input_hint: Some("report.md:::draft".into()),
            expected_outcome: "report.md exists".into(),
        };
        let retry = step.as_retry(Some("workspace_shell".into()), Some("echo hi".into()));
        assert_eq!(retry.step_id, step.step_id);
        assert_eq!(retry.description, step.description);
        assert_eq!(retry.expected_outcome, step.expected_outcome);
        assert_eq!(retry.tool_hint.as_deref(), Some("workspace_shell"));
        assert_eq!(retry.input_hint.as_deref(), Some("echo hi"));
    }

    #[test]
    fn checkbox_chars() {
        assert_eq!(AttemptStatus::Pending.checkbox_char(), ' ');
        assert_eq!(AttemptStatus::Success.checkbox_char(), 'x');
        assert_eq!(AttemptStatus::Failed.checkbox_char(), '!');
        assert_eq!(AttemptStatus::Cancelled.checkbox_char(), '-');
    }
}
