//! Inbound message dispatcher (§4.9): one handler per inbound `type`, run
//! against the connection's own `SessionRuntime`. At most one pipeline
//! operation runs per session at a time; a second attempt while one is
//! in flight is refused with a status message rather than queued.

use std::sync::Arc;

use ao_domain::outbound::{ArtifactEntry, OutboundMessage};
use ao_domain::plan::PlanStep;
use ao_domain::role::LlmRole;
use ao_domain::task::MessageKind;
use ao_domain::tool::{Message, ToolDefinition};
use ao_domain::trace::TraceEvent;
use ao_pipeline::{CallbackFanout, EventSink, IntentClassifier, PlanOutcome, Planner};
use ao_tools::ToolHandle;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::{self, SessionRuntime};
use crate::state::AppState;
use crate::ws::WsSink;

#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
}

pub async fn dispatch(state: &AppState, session: &mut SessionRuntime, sink: &Arc<WsSink>, envelope: InboundEnvelope) {
    let result = match envelope.kind.as_str() {
        "context_switch" => handle_context_switch(state, session, sink, envelope.content).await,
        "new_task" => handle_new_task(session, sink).await,
        "user_message" => handle_user_message(state, session, sink, envelope.content).await,
        "execute_confirmed_plan" => handle_execute_confirmed_plan(state, session, sink, envelope.content).await,
        "cancel_agent" => handle_cancel_agent(state, session, sink).await,
        "set_llm" => handle_set_llm(session, sink, envelope.content).await,
        "set_session_role_llm" => handle_set_session_role_llm(session, sink, envelope.content).await,
        "get_available_models" => {
            push_available_models(state, sink).await;
            Ok(())
        }
        "get_artifacts_for_task" => handle_get_artifacts(state, session, sink).await,
        "rename_task" => handle_rename_task(state, sink, envelope.content).await,
        "delete_task" => handle_delete_task(state, session, sink, envelope.content).await,
        "run_command" => handle_run_command(state, session, sink, envelope.content).await,
        other => {
            sink.send(OutboundMessage::StatusMessage {
                text: format!("unknown message type \"{other}\""),
                component_hint: "chat".into(),
                is_error: true,
            })
            .await;
            Ok(())
        }
    };

    if let Err(e) = result {
        sink.send(OutboundMessage::StatusMessage { text: e, component_hint: "chat".into(), is_error: true }).await;
    }
}

type DispatchResult = Result<(), String>;

fn tool_definitions(tools: &[Arc<dyn ToolHandle>]) -> Vec<ToolDefinition> {
    tools.iter().map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() }).collect()
}

fn require_task<'a>(session: &'a SessionRuntime) -> Result<&'a str, String> {
    session.current_task_id.as_deref().ok_or_else(|| "no active task; switch to or start a task first".to_string())
}

async fn push_artifacts(state: &AppState, task_id: &str, sink: &Arc<WsSink>) {
    match state.workspace.artifacts_for_task(task_id).await {
        Ok(views) => {
            let entries: Vec<ArtifactEntry> =
                views.into_iter().map(|v| ArtifactEntry { kind: v.kind, url: v.path, filename: v.filename }).collect();
            sink.send(OutboundMessage::UpdateArtifacts(entries)).await;
        }
        Err(e) => tracing::warn!(task_id, error = %e, "failed to list artifacts"),
    }
}

pub async fn push_available_models(state: &AppState, sink: &Arc<WsSink>) {
    sink.send(OutboundMessage::AvailableModels {
        providers: state.llm.available_models_by_provider(),
        default_executor_llm_id: state.llm.default_model_id().to_string(),
        role_llm_defaults: state.llm.role_model_ids().clone(),
    })
    .await;
}

#[derive(Debug, Deserialize)]
struct ContextSwitchPayload {
    task_id: String,
}

async fn handle_context_switch(state: &AppState, session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: ContextSwitchPayload = serde_json::from_value(content).map_err(|e| format!("context_switch: {e}"))?;

    state.cancel_map.cancel(session.cancel_key());

    let existing = state.store.get_task(&payload.task_id).await.map_err(|e| e.to_string())?;
    let created = existing.is_none();
    if created {
        state.store.ensure_task(&payload.task_id, &payload.task_id, chrono::Utc::now()).await.map_err(|e| e.to_string())?;
    }
    state.workspace.resolve(&payload.task_id, true).await.map_err(|e| e.to_string())?;

    TraceEvent::TaskContextSwitch { task_id: payload.task_id.clone(), created }.emit();

    session.current_task_id = Some(payload.task_id.clone());
    session.clear_memory();
    session.pending_user_query = None;

    crate::history::replay(&state.store, &payload.task_id, session, sink).await;
    push_artifacts(state, &payload.task_id, sink).await;
    Ok(())
}

async fn handle_new_task(session: &mut SessionRuntime, sink: &Arc<WsSink>) -> DispatchResult {
    session.current_task_id = None;
    session.clear_memory();
    session.pending_user_query = None;
    sink.send(OutboundMessage::UpdateArtifacts(Vec::new())).await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UserMessagePayload {
    text: String,
}

async fn handle_user_message(state: &AppState, session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: UserMessagePayload = serde_json::from_value(content).map_err(|e| format!("user_message: {e}"))?;

    if state.cancel_map.is_running(session.cancel_key()) {
        sink.send(OutboundMessage::StatusMessage {
            text: "a pipeline operation is already running for this session".into(),
            component_hint: "chat".into(),
            is_error: true,
        })
        .await;
        return Ok(());
    }

    let task_id = match &session.current_task_id {
        Some(id) => id.clone(),
        None => {
            let new_id = uuid::Uuid::new_v4().to_string();
            let title: String = payload.text.chars().take(48).collect();
            state.store.ensure_task(&new_id, &title, chrono::Utc::now()).await.map_err(|e| e.to_string())?;
            session.current_task_id = Some(new_id.clone());
            new_id
        }
    };
    state.workspace.resolve(&task_id, true).await.map_err(|e| e.to_string())?;

    state.store.append_message(&task_id, &session.session_id, MessageKind::UserInput, &payload.text).await;

    let tools = state.tools.tools_for_task(Some(&task_id)).await.map_err(|e| e.to_string())?;
    let tool_defs = tool_definitions(&tools);
    let memory = session.memory_slice();
    let sink_dyn: Arc<dyn EventSink> = sink.clone();
    let fanout = CallbackFanout::new(task_id.clone(), session.session_id.clone(), state.store.clone(), sink_dyn);

    let intent_override = session.session_override(LlmRole::Intent).map(str::to_string);
    let classifier = IntentClassifier::new(state.llm.clone());
    let intent = classifier.classify(&payload.text, &tool_defs, intent_override.as_deref()).await;

    match intent {
        ao_domain::plan::Intent::DirectQa => {
            let executor_override = session.session_override(LlmRole::Executor).map(str::to_string);
            // Registered only so the concurrency guard above sees this
            // session as busy; direct QA has no cooperative cancel point.
            let _cancel = state.cancel_map.register(session.cancel_key());
            let outcome = state.direct_qa.run(&payload.text, &tools, &memory, &fanout, executor_override.as_deref()).await;
            state.cancel_map.remove(session.cancel_key());
            match outcome {
                Ok(answer) => session.push_turn(Message::user(payload.text), Message::assistant(answer)),
                Err(e) => {
                    fanout.status(&format!("direct answer failed: {e}"), true).await;
                }
            }
        }
        ao_domain::plan::Intent::Plan => {
            let planner_override = session.session_override(LlmRole::Planner).map(str::to_string);
            let planner = Planner::new(state.llm.clone());
            match planner.plan(&payload.text, &tool_defs, planner_override.as_deref()).await {
                Ok(outline) => {
                    session.pending_user_query = Some(payload.text);
                    fanout.plan_for_confirmation(&outline.human_summary, outline.steps).await;
                }
                Err(e) => {
                    fanout.status(&format!("planning failed: {e}"), true).await;
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ExecuteConfirmedPlanPayload {
    human_summary: String,
    steps: Vec<PlanStep>,
}

async fn handle_execute_confirmed_plan(state: &AppState, session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: ExecuteConfirmedPlanPayload = serde_json::from_value(content).map_err(|e| format!("execute_confirmed_plan: {e}"))?;
    let task_id = require_task(session)?.to_string();

    if state.cancel_map.is_running(session.cancel_key()) {
        sink.send(OutboundMessage::StatusMessage {
            text: "a pipeline operation is already running for this session".into(),
            component_hint: "chat".into(),
            is_error: true,
        })
        .await;
        return Ok(());
    }

    let user_query = session.pending_user_query.take().unwrap_or_default();
    let task_dir = state.workspace.resolve(&task_id, true).await.map_err(|e| e.to_string())?;

    state
        .store
        .append_message(
            &task_id,
            &session.session_id,
            MessageKind::ConfirmedPlanLog,
            &json!({ "human_summary": payload.human_summary, "steps": payload.steps }).to_string(),
        )
        .await;

    let tools = state.tools.tools_for_task(Some(&task_id)).await.map_err(|e| e.to_string())?;
    let memory = session.memory_slice();
    let sink_dyn: Arc<dyn EventSink> = sink.clone();
    let fanout = CallbackFanout::new(task_id.clone(), session.session_id.clone(), state.store.clone(), sink_dyn);
    let executor_override = session.session_override(LlmRole::Executor).map(str::to_string);

    let cancel = state.cancel_map.register(session.cancel_key());
    let outcome = state
        .plan_executor
        .execute_confirmed_plan(&task_dir, &payload.human_summary, &user_query, payload.steps, &tools, &memory, &cancel, &fanout, executor_override.as_deref())
        .await;
    state.cancel_map.remove(session.cancel_key());

    match outcome {
        Ok(PlanOutcome::Completed { final_message, .. }) => {
            session.push_turn(Message::user(user_query), Message::assistant(final_message));
        }
        Ok(PlanOutcome::Failed { error, .. }) => {
            fanout.status(&format!("plan failed: {error}"), true).await;
        }
        Ok(PlanOutcome::Cancelled { .. }) => {}
        Err(e) => {
            fanout.status(&format!("plan execution error: {e}"), true).await;
        }
    }
    push_artifacts(state, &task_id, sink).await;
    Ok(())
}

async fn handle_cancel_agent(state: &AppState, session: &SessionRuntime, sink: &Arc<WsSink>) -> DispatchResult {
    let was_running = state.cancel_map.cancel(session.cancel_key());
    sink.send(OutboundMessage::StatusMessage {
        text: if was_running { "cancellation requested".into() } else { "nothing to cancel".into() },
        component_hint: "chat".into(),
        is_error: false,
    })
    .await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SetLlmPayload {
    model_id: String,
}

async fn handle_set_llm(session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: SetLlmPayload = serde_json::from_value(content).map_err(|e| format!("set_llm: {e}"))?;
    session.set_llm(&payload.model_id);
    sink.send(OutboundMessage::StatusMessage { text: "executor model updated".into(), component_hint: "chat".into(), is_error: false }).await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SetSessionRoleLlmPayload {
    role: String,
    model_id: String,
}

async fn handle_set_session_role_llm(session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: SetSessionRoleLlmPayload = serde_json::from_value(content).map_err(|e| format!("set_session_role_llm: {e}"))?;
    let role = session::parse_role(&payload.role).ok_or_else(|| format!("unknown role \"{}\"", payload.role))?;
    session.set_role_llm(role, &payload.model_id);
    sink.send(OutboundMessage::StatusMessage { text: format!("{role} model updated"), component_hint: "chat".into(), is_error: false }).await;
    Ok(())
}

async fn handle_get_artifacts(state: &AppState, session: &SessionRuntime, sink: &Arc<WsSink>) -> DispatchResult {
    let task_id = require_task(session)?;
    push_artifacts(state, task_id, sink).await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RenameTaskPayload {
    task_id: String,
    new_title: String,
}

async fn handle_rename_task(state: &AppState, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: RenameTaskPayload = serde_json::from_value(content).map_err(|e| format!("rename_task: {e}"))?;
    let renamed = state.store.rename_task(&payload.task_id, &payload.new_title).await.map_err(|e| e.to_string())?;
    sink.send(OutboundMessage::StatusMessage {
        text: if renamed { "task renamed".into() } else { format!("no such task \"{}\"", payload.task_id) },
        component_hint: "chat".into(),
        is_error: !renamed,
    })
    .await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DeleteTaskPayload {
    task_id: String,
}

async fn handle_delete_task(state: &AppState, session: &mut SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: DeleteTaskPayload = serde_json::from_value(content).map_err(|e| format!("delete_task: {e}"))?;
    let deleted = state.store.delete_task(&payload.task_id).await.map_err(|e| e.to_string())?;

    if deleted {
        if let Ok(task_dir) = state.workspace.resolve(&payload.task_id, false).await {
            if state.workspace.under_workspace_root(&task_dir) && task_dir.exists() {
                let _ = tokio::fs::remove_dir_all(&task_dir).await;
            }
        }
        if session.current_task_id.as_deref() == Some(payload.task_id.as_str()) {
            session.current_task_id = None;
            session.clear_memory();
            session.pending_user_query = None;
        }
    }

    sink.send(OutboundMessage::StatusMessage {
        text: if deleted { "task deleted".into() } else { format!("no such task \"{}\"", payload.task_id) },
        component_hint: "chat".into(),
        is_error: !deleted,
    })
    .await;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RunCommandPayload {
    command: String,
}

/// Runs a shell command directly in the active task's workspace, bypassing
/// the plan/tool-call abstraction entirely (§4.9, §5).
async fn handle_run_command(state: &AppState, session: &SessionRuntime, sink: &Arc<WsSink>, content: Value) -> DispatchResult {
    let payload: RunCommandPayload = serde_json::from_value(content).map_err(|e| format!("run_command: {e}"))?;
    let task_id = require_task(session)?;
    let task_dir = state.workspace.resolve(task_id, true).await.map_err(|e| e.to_string())?;

    let timeout = state.config.tools.timeout_for("run_command");
    let cap = state.config.tools.output_cap_for("run_command");
    let tool = ao_tools::shell::WorkspaceShellTool::new(task_dir, timeout, cap);
    let cancel = state.cancel_map.register(session.cancel_key());
    let result = tool.invoke(json!({ "command": payload.command }), cancel).await;
    state.cancel_map.remove(session.cancel_key());

    let (text, is_error) = match result {
        Ok(output) => (output, false),
        Err(e) => (e.to_string(), true),
    };
    state.store.append_message(task_id, &session.session_id, MessageKind::ToolResultForChat, &text).await;
    sink.send(OutboundMessage::AgentThinkingUpdate {
        status_key: "run_command".into(),
        sub_type: ao_domain::outbound::ThinkingSubType::SubStatus,
        body: ao_domain::outbound::ThinkingBody::Message(text),
        component_hint: "chat-tool-card".into(),
        details: Some(json!({ "isError": is_error })),
    })
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_task_fails_without_active_task() {
        let session = SessionRuntime::new("s1".into(), 5);
        assert!(require_task(&session).is_err());
    }

    #[test]
    fn require_task_returns_current_id() {
        let mut session = SessionRuntime::new("s1".into(), 5);
        session.current_task_id = Some("t1".into());
        assert_eq!(require_task(&session).unwrap(), "t1");
    }

    #[test]
    fn inbound_envelope_defaults_missing_content_to_null() {
        let envelope: InboundEnvelope = serde_json::from_str(r#"{"type":"cancel_agent"}"#).unwrap();
        assert_eq!(envelope.kind, "cancel_agent");
        assert!(envelope.content.is_null());
    }
}
