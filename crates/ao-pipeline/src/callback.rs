//! Callback fan-out (§4.5): the single sink for tool/LLM/agent lifecycle
//! events during a pipeline run. Each event is classified into a stream
//! event (sent to the gateway) and, where the spec names a persisted
//! kind, an appended message record. Events are emitted in call order —
//! the fan-out itself does no reordering or buffering.

use ao_domain::outbound::{OutboundMessage, ThinkingBody, ThinkingSubType};
use ao_domain::task::{ArtifactView, MessageKind};
use ao_providers::Usage;
use ao_store::Store;
use serde_json::json;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, message: OutboundMessage);
}

/// One fan-out instance per session; constructed fresh for each pipeline
/// invocation bound to the session's current task.
pub struct CallbackFanout {
    task_id: String,
    session_id: String,
    store: Arc<Store>,
    sink: Arc<dyn EventSink>,
}

impl CallbackFanout {
    pub fn new(task_id: String, session_id: String, store: Arc<Store>, sink: Arc<dyn EventSink>) -> Self {
        Self { task_id, session_id, store, sink }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn persist(&self, kind: MessageKind, payload: String) {
        self.store.append_message(&self.task_id, &self.session_id, kind, &payload).await;
    }

    /// An LLM start/end pair: a single bottom-line update tagged with the
    /// calling role.
    pub async fn llm_bottom_line(&self, role_label: &str) {
        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: format!("llm:{role_label}"),
                sub_type: ThinkingSubType::BottomLine,
                body: ThinkingBody::Message(format!("{role_label} is thinking…")),
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
    }

    pub async fn tool_started(&self, tool_name: &str) {
        let text = format!("Using {tool_name}…");
        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: format!("tool:{tool_name}"),
                sub_type: ThinkingSubType::SubStatus,
                body: ThinkingBody::Message(text.clone()),
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
        self.persist(MessageKind::SubStatus, json!({ "text": text }).to_string()).await;
    }

    pub async fn tool_finished(&self, tool_name: &str) {
        let text = format!("{tool_name} finished.");
        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: format!("tool:{tool_name}"),
                sub_type: ThinkingSubType::SubStatus,
                body: ThinkingBody::Message(text.clone()),
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
        self.persist(MessageKind::SubStatus, json!({ "text": text }).to_string()).await;
    }

    /// A tool error is signaled, not fatal to the plan on its own — the
    /// step evaluator decides whether it is recoverable.
    pub async fn tool_errored(&self, tool_name: &str, message: &str) {
        let text = format!("{tool_name} reported an error: {message}");
        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: format!("tool:{tool_name}"),
                sub_type: ThinkingSubType::SubStatus,
                body: ThinkingBody::Message(text.clone()),
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
        self.persist(MessageKind::SubStatus, json!({ "text": text, "is_error": true }).to_string()).await;
    }

    /// A reasoning trace: a thought event followed by a bottom-line
    /// "Processing action…".
    pub async fn thought(&self, label: &str, content_markdown: &str) {
        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: "thought".into(),
                sub_type: ThinkingSubType::Thought,
                body: ThinkingBody::Labeled { label: label.to_string(), content_markdown: content_markdown.to_string() },
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
        self.persist(
            MessageKind::Thought,
            json!({ "label": label, "content_markdown": content_markdown }).to_string(),
        )
        .await;

        self.sink
            .send(OutboundMessage::AgentThinkingUpdate {
                status_key: "thought-bottom-line".into(),
                sub_type: ThinkingSubType::BottomLine,
                body: ThinkingBody::Message("Processing action…".into()),
                component_hint: "thinking".into(),
                details: None,
            })
            .await;
    }

    pub async fn token_usage(&self, model_name: &str, usage: Usage, source: &str) {
        let message = OutboundMessage::LlmTokenUsage {
            model_name: model_name.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            source: source.to_string(),
        };
        self.persist(MessageKind::StatusMessage, serde_json::to_string(&usage_payload(model_name, usage, source)).unwrap_or_default()).await;
        self.sink.send(message).await;
    }

    /// `write_file`'s success sentinel triggers an `artifact_generated`
    /// persistence event and a stream refresh (§4.4, §4.7).
    pub async fn artifact_generated(&self, relative_path: &str) {
        self.persist(MessageKind::StatusMessage, json!({ "event": "artifact_generated", "path": relative_path }).to_string()).await;
        self.sink.send(OutboundMessage::TriggerArtifactRefresh { task_id: self.task_id.clone() }).await;
    }

    pub async fn update_artifacts(&self, artifacts: Vec<ArtifactView>) {
        let entries = artifacts
            .into_iter()
            .map(|a| ao_domain::outbound::ArtifactEntry { kind: a.kind, url: a.path.clone(), filename: a.filename })
            .collect();
        self.sink.send(OutboundMessage::UpdateArtifacts(entries)).await;
    }

    pub async fn plan_for_confirmation(&self, human_summary: &str, steps: Vec<ao_domain::plan::PlanStep>) {
        self.sink
            .send(OutboundMessage::DisplayPlanForConfirmation {
                human_summary: human_summary.to_string(),
                structured_plan: steps,
            })
            .await;
    }

    pub async fn final_agent_message(&self, content: &str) {
        self.sink
            .send(OutboundMessage::AgentMessage { content: content.to_string(), component_hint: "chat".into() })
            .await;
        self.persist(MessageKind::AgentMessage, content.to_string()).await;
    }

    pub async fn status(&self, text: &str, is_error: bool) {
        self.sink
            .send(OutboundMessage::StatusMessage { text: text.to_string(), component_hint: "chat".into(), is_error })
            .await;
        self.persist(MessageKind::StatusMessage, json!({ "text": text, "isError": is_error }).to_string()).await;
    }

    /// Always emitted to the stream; also replayed to the monitor
    /// side-channel.
    pub async fn monitor_log(&self, text: &str, log_source: &str) {
        self.sink.send(OutboundMessage::MonitorLog { text: text.to_string(), log_source: log_source.to_string() }).await;
        self.persist(MessageKind::MonitorLog, json!({ "text": text, "log_source": log_source }).to_string()).await;
    }

    /// Cancellation does not persist a final `agent_message`; it persists
    /// a cancellation monitor log instead (§5).
    pub async fn cancelled(&self) {
        self.monitor_log("plan execution cancelled", "pipeline").await;
    }
}

fn usage_payload(model_name: &str, usage: Usage, source: &str) -> serde_json::Value {
    json!({
        "model_name": model_name,
        "input_tokens": usage.input_tokens,
        "output_tokens": usage.output_tokens,
        "total_tokens": usage.total(),
        "source": source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    struct RecordingSink {
        messages: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, message: OutboundMessage) {
            self.messages.lock().push(message);
        }
    }

    async fn fanout_with_store() -> (CallbackFanout, Arc<RecordingSink>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("db.sqlite")).await.unwrap());
        store.ensure_task("t1", "Task One", chrono::Utc::now()).await.unwrap();
        let sink = Arc::new(RecordingSink { messages: Mutex::new(Vec::new()) });
        let fanout = CallbackFanout::new("t1".into(), "s1".into(), store, sink.clone());
        (fanout, sink)
    }

    #[tokio::test]
    async fn tool_lifecycle_emits_and_persists_sub_status() {
        let (fanout, sink) = fanout_with_store().await;
        fanout.tool_started("search").await;
        fanout.tool_finished("search").await;
        assert_eq!(sink.messages.lock().len(), 2);
    }

    #[tokio::test]
    async fn thought_emits_thought_then_bottom_line() {
        let (fanout, sink) = fanout_with_store().await;
        fanout.thought("Reasoning", "because x").await;
        let messages = sink.messages.lock();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].type_name(), "agent_thinking_update");
        assert_eq!(messages[1].type_name(), "agent_thinking_update");
    }

    #[tokio::test]
    async fn cancelled_emits_monitor_log_not_agent_message() {
        let (fanout, sink) = fanout_with_store().await;
        fanout.cancelled().await;
        let messages = sink.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].type_name(), "monitor_log");
    }
}
