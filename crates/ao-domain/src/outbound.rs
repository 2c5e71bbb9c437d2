//! Outbound client-channel vocabulary. Every message the gateway sends to
//! a connected browser is one of these, wrapped in a `{"type", "content"}`
//! envelope. Centralized here so both the pipeline's callback fan-out and
//! the gateway's dispatcher (which emits history replay and catalog
//! messages that never touch the pipeline) serialize identically.

use crate::plan::PlanStep;
use crate::task::ArtifactKind;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingSubType {
    BottomLine,
    SubStatus,
    Thought,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ThinkingBody {
    Message(String),
    Labeled { label: String, content_markdown: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub enum OutboundMessage {
    StatusMessage {
        text: String,
        component_hint: String,
        is_error: bool,
    },
    AgentMessage {
        content: String,
        component_hint: String,
    },
    AgentThinkingUpdate {
        status_key: String,
        sub_type: ThinkingSubType,
        body: ThinkingBody,
        component_hint: String,
        details: Option<Value>,
    },
    MonitorLog {
        text: String,
        log_source: String,
    },
    LlmTokenUsage {
        model_name: String,
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
        source: String,
    },
    DisplayPlanForConfirmation {
        human_summary: String,
        structured_plan: Vec<PlanStep>,
    },
    UpdateArtifacts(Vec<ArtifactEntry>),
    TriggerArtifactRefresh {
        task_id: String,
    },
    AvailableModels {
        providers: HashMap<String, Vec<String>>,
        default_executor_llm_id: String,
        role_llm_defaults: HashMap<String, String>,
    },
    HistoryStart {
        text: String,
    },
    HistoryEnd {
        text: String,
    },
}

impl OutboundMessage {
    /// The `type` discriminant used on the wire; stable across releases.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::StatusMessage { .. } => "status_message",
            OutboundMessage::AgentMessage { .. } => "agent_message",
            OutboundMessage::AgentThinkingUpdate { .. } => "agent_thinking_update",
            OutboundMessage::MonitorLog { .. } => "monitor_log",
            OutboundMessage::LlmTokenUsage { .. } => "llm_token_usage",
            OutboundMessage::DisplayPlanForConfirmation { .. } => "display_plan_for_confirmation",
            OutboundMessage::UpdateArtifacts(_) => "update_artifacts",
            OutboundMessage::TriggerArtifactRefresh { .. } => "trigger_artifact_refresh",
            OutboundMessage::AvailableModels { .. } => "available_models",
            OutboundMessage::HistoryStart { .. } => "history_start",
            OutboundMessage::HistoryEnd { .. } => "history_end",
        }
    }

    /// Render the `{"type": ..., "content": ...}` envelope sent on the wire.
    pub fn to_envelope(&self) -> Value {
        let content = match self {
            OutboundMessage::StatusMessage { text, component_hint, is_error } => json!({
                "text": text, "component_hint": component_hint, "isError": is_error,
            }),
            OutboundMessage::AgentMessage { content, component_hint } => json!({
                "content": content, "component_hint": component_hint,
            }),
            OutboundMessage::AgentThinkingUpdate { status_key, sub_type, body, component_hint, details } => {
                let mut value = json!({
                    "status_key": status_key,
                    "sub_type": sub_type,
                    "component_hint": component_hint,
                });
                match body {
                    ThinkingBody::Message(message) => {
                        value["message"] = json!(message);
                    }
                    ThinkingBody::Labeled { label, content_markdown } => {
                        value["label"] = json!(label);
                        value["content_markdown"] = json!(content_markdown);
                    }
                }
                if let Some(details) = details {
                    value["details"] = details.clone();
                }
                value
            }
            OutboundMessage::MonitorLog { text, log_source } => json!({
                "text": text, "log_source": log_source,
            }),
            OutboundMessage::LlmTokenUsage { model_name, input_tokens, output_tokens, total_tokens, source } => json!({
                "model_name": model_name,
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
                "total_tokens": total_tokens,
                "source": source,
            }),
            OutboundMessage::DisplayPlanForConfirmation { human_summary, structured_plan } => json!({
                "human_summary": human_summary,
                "structured_plan": structured_plan,
            }),
            OutboundMessage::UpdateArtifacts(entries) => json!(entries),
            OutboundMessage::TriggerArtifactRefresh { task_id } => json!({ "taskId": task_id }),
            OutboundMessage::AvailableModels { providers, default_executor_llm_id, role_llm_defaults } => {
                let mut value = serde_json::to_value(providers).unwrap_or_else(|_| json!({}));
                value["default_executor_llm_id"] = json!(default_executor_llm_id);
                value["role_llm_defaults"] = json!(role_llm_defaults);
                value
            }
            OutboundMessage::HistoryStart { text } => json!({ "text": text }),
            OutboundMessage::HistoryEnd { text } => json!({ "text": text }),
        };
        json!({ "type": self.type_name(), "content": content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_type_and_content() {
        let message = OutboundMessage::StatusMessage {
            text: "hi".into(),
            component_hint: "chat".into(),
            is_error: false,
        };
        let envelope = message.to_envelope();
        assert_eq!(envelope["type"], "status_message");
        assert_eq!(envelope["content"]["text"], "hi");
    }

    #[test]
    fn thinking_update_with_labeled_body() {
        let message = OutboundMessage::AgentThinkingUpdate {
            status_key: "step-1".into(),
            sub_type: ThinkingSubType::Thought,
            body: ThinkingBody::Labeled { label: "Reasoning".into(), content_markdown: "because...".into() },
            component_hint: "thinking".into(),
            details: None,
        };
        let envelope = message.to_envelope();
        assert_eq!(envelope["content"]["label"], "Reasoning");
        assert_eq!(envelope["content"]["content_markdown"], "because...");
    }

    #[test]
    fn available_models_merges_provider_map_with_defaults() {
        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), vec!["gpt-4o-mini".to_string()]);
        let message = OutboundMessage::AvailableModels {
            providers,
            default_executor_llm_id: "gpt-4o-mini".into(),
            role_llm_defaults: HashMap::new(),
        };
        let envelope = message.to_envelope();
        assert_eq!(envelope["content"]["openai"][0], "gpt-4o-mini");
        assert_eq!(envelope["content"]["default_executor_llm_id"], "gpt-4o-mini");
    }
}
