//! Plan Executor (§4.7): the core state machine. For each confirmed step,
//! runs controller -> executor -> step-evaluator with bounded retry,
//! patches the plan-file checkbox, and finishes with the overall
//! evaluator's assessment as the user-facing message.

use crate::callback::CallbackFanout;
use crate::plan_file::{plan_filename, render_plan_markdown, PlanFile};
use crate::transforms::{Controller, OverallEvaluator, StepEvaluator};
use ao_domain::cancel::CancelToken;
use ao_domain::config::PipelineConfig;
use ao_domain::error::Result;
use ao_domain::plan::{AttemptStatus, ControllerDecision, PlanOutline, PlanStep, PlanTrace, StepAttempt, StepTrace};
use ao_domain::tool::{Message, ToolDefinition};
use ao_domain::trace::TraceEvent;
use ao_providers::ProviderRegistry;
use ao_tools::{ToolHandle, WRITE_FILE_SUCCESS_PREFIX};
use std::path::Path;
use std::sync::Arc;

pub enum PlanOutcome {
    Completed { final_message: String, trace: PlanTrace },
    Cancelled { trace: PlanTrace },
    Failed { error: String, trace: PlanTrace },
}

pub struct PlanExecutor {
    registry: Arc<ProviderRegistry>,
    config: PipelineConfig,
}

fn tool_definitions(tools: &[Arc<dyn ToolHandle>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
        .collect()
}

fn find_tool<'a>(tools: &'a [Arc<dyn ToolHandle>], name: &str) -> Option<&'a Arc<dyn ToolHandle>> {
    tools.iter().find(|t| t.name() == name)
}

impl PlanExecutor {
    pub fn new(registry: Arc<ProviderRegistry>, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute_confirmed_plan(
        &self,
        task_dir: &Path,
        human_summary: &str,
        user_query: &str,
        confirmed_steps: Vec<PlanStep>,
        tools: &[Arc<dyn ToolHandle>],
        memory: &[Message],
        cancel: &CancelToken,
        callback: &CallbackFanout,
        session_override: Option<&str>,
    ) -> Result<PlanOutcome> {
        let controller = Controller::new(self.registry.clone());
        let step_evaluator = StepEvaluator::new(self.registry.clone());
        let overall_evaluator = OverallEvaluator::new(self.registry.clone());
        let tool_defs = tool_definitions(tools);

        let outline = PlanOutline { human_summary: human_summary.to_string(), steps: confirmed_steps.clone() };

        if outline.steps.is_empty() {
            return Ok(PlanOutcome::Completed {
                final_message: "The plan had no steps to execute.".to_string(),
                trace: PlanTrace { steps: Vec::new(), final_status: Some(AttemptStatus::Success) },
            });
        }

        let now = timestamp_millis();
        let plan_id = format!("plan-{now}");
        let filename = plan_filename(now);
        let markdown = render_plan_markdown(&plan_id, user_query, &outline);
        let plan_file = PlanFile::write_new(task_dir, &filename, &markdown).await?;
        callback.artifact_generated(&filename).await;
        TraceEvent::PlanGenerated { task_id: callback.task_id().to_string(), step_count: outline.steps.len() }.emit();

        let mut trace = PlanTrace { steps: Vec::new(), final_status: None };
        let mut last_successful_step_output: Option<String> = None;

        for step in &outline.steps {
            if cancel.is_cancelled() {
                trace.final_status = Some(AttemptStatus::Cancelled);
                callback.cancelled().await;
                TraceEvent::Cancelled { session_id: callback.session_id().to_string(), task_id: Some(callback.task_id().to_string()) }.emit();
                return Ok(PlanOutcome::Cancelled { trace });
            }

            let mut step_trace = StepTrace::new(step.step_id);
            let mut attempt_number = 1u32;
            let mut current_step = step.clone();
            let mut terminal_status = AttemptStatus::Failed;
            let mut last_error: Option<String> = None;

            loop {
                if cancel.is_cancelled() {
                    step_trace.final_status = AttemptStatus::Cancelled;
                    trace.steps.push(step_trace);
                    trace.final_status = Some(AttemptStatus::Cancelled);
                    callback.cancelled().await;
                    TraceEvent::Cancelled { session_id: callback.session_id().to_string(), task_id: Some(callback.task_id().to_string()) }.emit();
                    return Ok(PlanOutcome::Cancelled { trace });
                }

                let decision = match controller
                    .decide(user_query, &current_step, &tool_defs, last_successful_step_output.as_deref(), session_override)
                    .await
                {
                    Ok(d) => d,
                    Err(e) => {
                        last_error = Some(format!("controller error: {e}"));
                        break;
                    }
                };
                callback.llm_bottom_line("controller").await;
                callback.thought("Controller reasoning", &decision.reasoning).await;
                TraceEvent::StepAttemptStarted { task_id: callback.task_id().to_string(), step_id: step.step_id, attempt_number }.emit();

                let (executor_output, is_error) =
                    self.run_executor_phase(&decision, &current_step, tools, memory, callback, session_override).await;

                if cancel.is_cancelled() {
                    step_trace.attempts.push(StepAttempt {
                        attempt_number,
                        controller_decision: decision,
                        executor_input_prompt: current_step.description.clone(),
                        executor_output: Some(executor_output.clone()),
                        error: if is_error { Some(executor_output.clone()) } else { None },
                        evaluator_verdict: None,
                        status: AttemptStatus::Cancelled,
                    });
                    step_trace.final_status = AttemptStatus::Cancelled;
                    trace.steps.push(step_trace);
                    trace.final_status = Some(AttemptStatus::Cancelled);
                    callback.cancelled().await;
                    TraceEvent::Cancelled { session_id: callback.session_id().to_string(), task_id: Some(callback.task_id().to_string()) }.emit();
                    return Ok(PlanOutcome::Cancelled { trace });
                }

                let verdict = step_evaluator
                    .evaluate(&current_step, &decision, &executor_output, is_error, session_override)
                    .await;

                let verdict = match verdict {
                    Ok(v) => v,
                    Err(e) => {
                        last_error = Some(format!("step evaluator error: {e}"));
                        step_trace.attempts.push(StepAttempt {
                            attempt_number,
                            controller_decision: decision,
                            executor_input_prompt: current_step.description.clone(),
                            executor_output: Some(executor_output.clone()),
                            error: Some(format!("evaluator failure: {e}")),
                            evaluator_verdict: None,
                            status: AttemptStatus::Failed,
                        });
                        break;
                    }
                };

                if verdict.achieved_goal {
                    step_trace.attempts.push(StepAttempt {
                        attempt_number,
                        controller_decision: decision,
                        executor_input_prompt: current_step.description.clone(),
                        executor_output: Some(executor_output.clone()),
                        error: None,
                        evaluator_verdict: Some(verdict),
                        status: AttemptStatus::Success,
                    });
                    terminal_status = AttemptStatus::Success;
                    last_successful_step_output = Some(executor_output);
                    last_error = None;
                    break;
                }

                let recoverable = verdict.is_recoverable_via_retry && attempt_number <= self.config.max_step_retries.max(1);
                step_trace.attempts.push(StepAttempt {
                    attempt_number,
                    controller_decision: decision,
                    executor_input_prompt: current_step.description.clone(),
                    executor_output: Some(executor_output.clone()),
                    error: if is_error { Some(executor_output.clone()) } else { None },
                    evaluator_verdict: Some(verdict.clone()),
                    status: if recoverable { AttemptStatus::Pending } else { AttemptStatus::Failed },
                });

                if recoverable {
                    current_step = step.as_retry(verdict.suggested_new_tool_for_retry.clone(), verdict.suggested_new_input_instructions_for_retry.clone());
                    attempt_number += 1;
                    continue;
                }

                last_error = Some(verdict.assessment);
                break;
            }

            step_trace.final_status = terminal_status;
            TraceEvent::StepAttemptFinished {
                task_id: callback.task_id().to_string(),
                step_id: step.step_id,
                attempt_number: step_trace.attempts.len() as u32,
                status: terminal_status.checkbox_char(),
            }
            .emit();
            trace.steps.push(step_trace);

            plan_file.patch_step(step.step_id, terminal_status).await?;
            callback.artifact_generated(&filename).await;

            if terminal_status != AttemptStatus::Success {
                last_successful_step_output = None;
                trace.final_status = Some(terminal_status);
                TraceEvent::PlanFinished { task_id: callback.task_id().to_string(), status: terminal_status.checkbox_char() }.emit();
                let error = last_error.unwrap_or_else(|| "step failed with no recorded error".to_string());
                return Ok(PlanOutcome::Failed { error, trace });
            }
        }

        trace.final_status = Some(AttemptStatus::Success);
        TraceEvent::PlanFinished { task_id: callback.task_id().to_string(), status: AttemptStatus::Success.checkbox_char() }.emit();

        let plan_trace_text = render_trace_text(&trace);
        let final_answer = last_successful_step_output.unwrap_or_default();
        match overall_evaluator.evaluate(user_query, &plan_trace_text, &final_answer, session_override).await {
            Ok(verdict) => {
                callback.final_agent_message(&verdict.assessment).await;
                Ok(PlanOutcome::Completed { final_message: verdict.assessment, trace })
            }
            Err(e) => {
                tracing::warn!(error = %e, "overall evaluator failed, surfacing last successful step output");
                callback.final_agent_message(&final_answer).await;
                Ok(PlanOutcome::Completed { final_message: final_answer, trace })
            }
        }
    }

    /// Executor phase: when the controller chose a tool, invoke it directly
    /// with the exact input and report the result verbatim. When reasoning-
    /// only, call the executor LLM.
    async fn run_executor_phase(
        &self,
        decision: &ControllerDecision,
        step: &PlanStep,
        tools: &[Arc<dyn ToolHandle>],
        memory: &[Message],
        callback: &CallbackFanout,
        session_override: Option<&str>,
    ) -> (String, bool) {
        match &decision.tool_name {
            Some(tool_name) => {
                let Some(tool) = find_tool(tools, tool_name) else {
                    return (format!("tool '{tool_name}' is not available"), true);
                };
                let args = decision.tool_input.clone().unwrap_or(serde_json::json!({}));
                callback.tool_started(tool_name).await;
                let cancel = CancelToken::new();
                match tool.invoke(args, cancel).await {
                    Ok(output) => {
                        callback.tool_finished(tool_name).await;
                        if let Some(relative) = output.strip_prefix(WRITE_FILE_SUCCESS_PREFIX) {
                            callback.artifact_generated(relative).await;
                        }
                        (output, false)
                    }
                    Err(e) => {
                        callback.tool_errored(tool_name, &e.to_string()).await;
                        (e.to_string(), true)
                    }
                }
            }
            None => {
                let handle = match self.registry.get(ao_domain::role::LlmRole::Executor, session_override) {
                    Ok(h) => h,
                    Err(e) => return (format!("executor LLM unavailable: {e}"), true),
                };
                let mut messages = vec![Message::system(format!(
                    "You are executing a single plan step via reasoning only, with no tool. \
                     Step: {}\nExpected outcome: {}",
                    step.description, step.expected_outcome
                ))];
                messages.extend_from_slice(memory);
                messages.push(Message::user(step.description.clone()));

                let request = ao_providers::ChatRequest {
                    messages,
                    model: Some(handle.model.clone()),
                    ..Default::default()
                };
                callback.llm_bottom_line("executor").await;
                match handle.provider.chat(request).await {
                    Ok(response) => {
                        if let Some(usage) = response.usage {
                            callback.token_usage(&response.model, usage, "executor").await;
                        }
                        (response.content, false)
                    }
                    Err(e) => (e.to_string(), true),
                }
            }
        }
    }
}

fn render_trace_text(trace: &PlanTrace) -> String {
    let mut out = String::new();
    for step_trace in &trace.steps {
        out.push_str(&format!("Step {} -> {:?}\n", step_trace.step_id, step_trace.final_status));
        for attempt in &step_trace.attempts {
            out.push_str(&format!(
                "  attempt {}: tool={:?} status={:?}\n",
                attempt.attempt_number, attempt.controller_decision.tool_name, attempt.status
            ));
        }
    }
    out
}

fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::EventSink;
    use ao_domain::outbound::OutboundMessage;
    use ao_domain::tool::ToolCall;
    use ao_providers::{ChatResponse, LlmProvider};
    use ao_store::Store;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use tempfile::tempdir;

    struct NoopSink;
    #[async_trait::async_trait]
    impl EventSink for NoopSink {
        async fn send(&self, _message: OutboundMessage) {}
    }

    struct ScriptedProvider {
        controller: Mutex<VecDeque<String>>,
        step_eval: Mutex<VecDeque<String>>,
        overall_eval: Mutex<VecDeque<String>>,
        models: Vec<String>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, req: ao_providers::ChatRequest) -> ao_domain::error::Result<ChatResponse> {
            let system = req.messages.first().and_then(|m| m.content.text()).unwrap_or_default().to_string();
            let body = if system.contains("select at most one tool") {
                self.controller.lock().pop_front()
            } else if system.contains("judge whether a plan step") {
                self.step_eval.lock().pop_front()
            } else if system.contains("judge whether a completed plan") {
                self.overall_eval.lock().pop_front()
            } else {
                None
            }
            .unwrap_or_else(|| "{}".to_string());

            Ok(ChatResponse {
                content: body,
                tool_calls: Vec::<ToolCall>::new(),
                usage: None,
                model: "test-model".into(),
                finish_reason: Some("stop".into()),
            })
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }

        fn available_models(&self) -> &[String] {
            &self.models
        }
    }

    struct EchoTool;
    #[async_trait::async_trait]
    impl ToolHandle for EchoTool {
        fn name(&self) -> &str {
            "echo_tool"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, args: serde_json::Value, _cancel: CancelToken) -> ao_domain::error::Result<String> {
            Ok(args["msg"].as_str().unwrap_or_default().to_string())
        }
    }

    fn registry_with(provider: ScriptedProvider) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::with_providers(vec![Arc::new(provider)], HashMap::new(), "test-model".into()))
    }

    async fn fanout(dir: &std::path::Path) -> CallbackFanout {
        let store = Arc::new(Store::open(&dir.join("db.sqlite")).await.unwrap());
        store.ensure_task("t1", "Task", chrono::Utc::now()).await.unwrap();
        CallbackFanout::new("t1".into(), "s1".into(), store, Arc::new(NoopSink))
    }

    #[tokio::test]
    async fn zero_step_plan_completes_immediately() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider { controller: Mutex::new(VecDeque::new()), step_eval: Mutex::new(VecDeque::new()), overall_eval: Mutex::new(VecDeque::new()), models: vec!["test-model".to_string()] };
        let executor = PlanExecutor::new(registry_with(provider), PipelineConfig { memory_window: 20, max_step_retries: 1 });
        let callback = fanout(dir.path()).await;

        let outcome = executor
            .execute_confirmed_plan(dir.path(), "empty plan", "do nothing", Vec::new(), &[], &[], &CancelToken::new(), &callback, None)
            .await
            .unwrap();

        match outcome {
            PlanOutcome::Completed { trace, .. } => assert!(trace.steps.is_empty()),
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn single_step_plan_succeeds_with_tool_on_first_attempt() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider {
            controller: Mutex::new(VecDeque::from([json!({
                "tool_name": "echo_tool", "tool_input": {"msg": "hi"}, "reasoning": "use echo", "confidence": 0.9
            }).to_string()])),
            step_eval: Mutex::new(VecDeque::from([json!({
                "achieved_goal": true, "assessment": "done", "is_recoverable_via_retry": false,
                "suggested_new_tool_for_retry": null, "suggested_new_input_instructions_for_retry": null, "confidence": 0.9
            }).to_string()])),
            overall_eval: Mutex::new(VecDeque::from([json!({
                "overall_success": true, "assessment": "All done.", "missing_information": null,
                "suggestions_for_replan": null, "confidence": 0.95
            }).to_string()])),
            models: vec!["test-model".to_string()],
        };
        let executor = PlanExecutor::new(registry_with(provider), PipelineConfig { memory_window: 20, max_step_retries: 1 });
        let callback = fanout(dir.path()).await;
        let tools: Vec<Arc<dyn ToolHandle>> = vec![Arc::new(EchoTool)];
        let steps = vec![PlanStep { step_id: 1, description: "echo hi".into(), tool_hint: Some("echo_tool".into()), input_hint: None, expected_outcome: "hi printed".into() }];

        let outcome = executor
            .execute_confirmed_plan(dir.path(), "echo plan", "echo hi please", steps, &tools, &[], &CancelToken::new(), &callback, None)
            .await
            .unwrap();

        match outcome {
            PlanOutcome::Completed { final_message, trace } => {
                assert_eq!(final_message, "All done.");
                assert_eq!(trace.final_status, Some(AttemptStatus::Success));
                assert_eq!(trace.steps[0].final_status, AttemptStatus::Success);
            }
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_first_controller_call() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider { controller: Mutex::new(VecDeque::new()), step_eval: Mutex::new(VecDeque::new()), overall_eval: Mutex::new(VecDeque::new()), models: vec!["test-model".to_string()] };
        let executor = PlanExecutor::new(registry_with(provider), PipelineConfig { memory_window: 20, max_step_retries: 1 });
        let callback = fanout(dir.path()).await;
        let cancel = CancelToken::new();
        cancel.cancel();
        let steps = vec![PlanStep { step_id: 1, description: "anything".into(), tool_hint: None, input_hint: None, expected_outcome: "n/a".into() }];

        let outcome = executor
            .execute_confirmed_plan(dir.path(), "plan", "query", steps, &[], &[], &cancel, &callback, None)
            .await
            .unwrap();

        assert!(matches!(outcome, PlanOutcome::Cancelled { .. }));
    }
}
