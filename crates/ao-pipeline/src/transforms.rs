//! Planner / intent classifier / controller / evaluators (§4.6).
//!
//! Each transform is "prompt + structured-output shape": render a system
//! prompt, call the resolved role LLM in JSON mode, and parse the result
//! into the matching domain type. None of these carry state between calls.

use ao_domain::error::{Error, Result};
use ao_domain::plan::{ControllerDecision, EvaluationOutcome, Intent, OverallEvaluation, PlanOutline, PlanStep};
use ao_domain::role::LlmRole;
use ao_domain::tool::ToolDefinition;
use ao_providers::{ChatRequest, ProviderRegistry};
use serde::de::DeserializeOwned;
use std::sync::Arc;

fn tool_summary(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "(no tools available)".to_string();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn call_json<T: DeserializeOwned>(
    registry: &ProviderRegistry,
    role: LlmRole,
    session_override: Option<&str>,
    system_prompt: String,
    user_prompt: String,
) -> Result<T> {
    let handle = registry.get(role, session_override)?;
    let request = ChatRequest {
        messages: vec![
            ao_domain::tool::Message::system(system_prompt),
            ao_domain::tool::Message::user(user_prompt),
        ],
        json_mode: true,
        model: Some(handle.model.clone()),
        ..Default::default()
    };
    let response = handle.provider.chat(request).await?;
    serde_json::from_str(&response.content)
        .map_err(|e| Error::Provider { provider: handle.provider.provider_id().to_string(), message: format!("malformed structured output: {e}") })
}

/// Input: user query + tool summary. Output: human summary + plan steps.
pub struct Planner {
    registry: Arc<ProviderRegistry>,
}

impl Planner {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn plan(&self, query: &str, tools: &[ToolDefinition], session_override: Option<&str>) -> Result<PlanOutline> {
        let system = "You are a planning assistant. Given a user request and the available tools, \
                       produce a short human-readable summary and a numbered list of plan steps. \
                       Each step needs a non-empty description and expected_outcome; tool_hint is optional. \
                       Respond as JSON: {\"human_summary\": string, \"steps\": [{\"step_id\": int, \"description\": string, \"tool_hint\": string|null, \"input_hint\": string|null, \"expected_outcome\": string}]}."
            .to_string();
        let user = format!("User request: {query}\n\nAvailable tools:\n{}", tool_summary(tools));
        call_json(&self.registry, LlmRole::Planner, session_override, system, user).await
    }
}

/// Input: user query + tool summary. Output: `PLAN` or `DIRECT_QA`.
/// Defaults to `PLAN` on any failure (§4.6).
pub struct IntentClassifier {
    registry: Arc<ProviderRegistry>,
}

impl IntentClassifier {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn classify(&self, query: &str, tools: &[ToolDefinition], session_override: Option<&str>) -> Intent {
        let system = "Classify the user request as requiring a multi-step PLAN or a single DIRECT_QA answer. \
                       Respond as JSON: {\"intent\": \"plan\"|\"direct_qa\"}."
            .to_string();
        let user = format!("User request: {query}\n\nAvailable tools:\n{}", tool_summary(tools));

        #[derive(serde::Deserialize)]
        struct IntentResponse {
            intent: Intent,
        }

        match call_json::<IntentResponse>(&self.registry, LlmRole::Intent, session_override, system, user).await {
            Ok(response) => response.intent,
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, defaulting to plan");
                Intent::Plan
            }
        }
    }
}

/// Input: original query, one step, available tool schemas, and the
/// previous step's output (when present). Output: `ControllerDecision`.
pub struct Controller {
    registry: Arc<ProviderRegistry>,
}

impl Controller {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn decide(
        &self,
        query: &str,
        step: &PlanStep,
        tools: &[ToolDefinition],
        previous_step_output: Option<&str>,
        session_override: Option<&str>,
    ) -> Result<ControllerDecision> {
        let system = "You select at most one tool to advance a single plan step. \
                       Choose \"no tool\" only when the step is reasoning-only. \
                       tool_input must match the chosen tool's schema exactly, and must be null when tool_name is null. \
                       Respond as JSON: {\"tool_name\": string|null, \"tool_input\": object|null, \"reasoning\": string, \"confidence\": number}."
            .to_string();
        let mut user = format!(
            "Original user request: {query}\n\nCurrent step ({}): {}\nExpected outcome: {}\n",
            step.step_id, step.description, step.expected_outcome
        );
        if let Some(hint) = &step.tool_hint {
            user.push_str(&format!("Tool hint: {hint}\n"));
        }
        if let Some(hint) = &step.input_hint {
            user.push_str(&format!("Input hint: {hint}\n"));
        }
        if let Some(previous) = previous_step_output {
            user.push_str(&format!("\nPrevious step output:\n{previous}\n"));
        }
        user.push_str(&format!("\nAvailable tools:\n{}", tool_summary(tools)));

        let decision: ControllerDecision =
            call_json(&self.registry, LlmRole::Controller, session_override, system, user).await?;

        if decision.confidence < 0.70 {
            tracing::warn!(step_id = step.step_id, confidence = decision.confidence, "controller confidence below threshold");
        }
        if !decision.is_consistent() {
            return Err(Error::Other(format!(
                "controller decision inconsistent: tool_name={:?} tool_input.is_some()={}",
                decision.tool_name,
                decision.tool_input.is_some()
            )));
        }
        Ok(decision)
    }
}

/// Input: step, controller decision, executor output, available tools.
/// Output: step-level `EvaluationOutcome`, used to decide retry.
pub struct StepEvaluator {
    registry: Arc<ProviderRegistry>,
}

impl StepEvaluator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn evaluate(
        &self,
        step: &PlanStep,
        decision: &ControllerDecision,
        executor_output_or_error: &str,
        is_error: bool,
        session_override: Option<&str>,
    ) -> Result<EvaluationOutcome> {
        let system = "You judge whether a plan step's attempt achieved its expected outcome. \
                       Respond as JSON: {\"achieved_goal\": bool, \"assessment\": string, \"is_recoverable_via_retry\": bool, \
                       \"suggested_new_tool_for_retry\": string|null, \"suggested_new_input_instructions_for_retry\": string|null, \"confidence\": number}."
            .to_string();
        let user = format!(
            "Step: {}\nExpected outcome: {}\nController chose tool: {:?}\n{}: {}",
            step.description,
            step.expected_outcome,
            decision.tool_name,
            if is_error { "Error" } else { "Output" },
            executor_output_or_error
        );
        call_json(&self.registry, LlmRole::Evaluator, session_override, system, user).await
    }
}

/// Input: original query, a textual trace of the whole plan, and the
/// final answer. Output: overall `EvaluationOutcome`.
pub struct OverallEvaluator {
    registry: Arc<ProviderRegistry>,
}

impl OverallEvaluator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn evaluate(&self, query: &str, plan_trace_text: &str, final_answer: &str, session_override: Option<&str>) -> Result<OverallEvaluation> {
        let system = "You judge whether a completed plan satisfied the user's original request. \
                       Respond as JSON: {\"overall_success\": bool, \"assessment\": string, \"missing_information\": [string]|null, \
                       \"suggestions_for_replan\": [string]|null, \"confidence\": number}."
            .to_string();
        let user = format!("Original request: {query}\n\nPlan trace:\n{plan_trace_text}\n\nFinal answer:\n{final_answer}");
        call_json(&self.registry, LlmRole::Evaluator, session_override, system, user).await
    }
}
