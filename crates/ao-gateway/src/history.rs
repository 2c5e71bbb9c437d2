//! History replay (§4.10): on `context_switch`, stream a task's persisted
//! messages back to the client in the shapes that reconstruct prior UI
//! state, and reload the most recent user/assistant pairs into the
//! session's memory window.

use std::sync::Arc;

use ao_domain::outbound::{OutboundMessage, ThinkingBody, ThinkingSubType};
use ao_domain::task::{MessageKind, MessageRecord};
use ao_domain::tool::Message;
use ao_store::Store;

use crate::session::SessionRuntime;
use crate::ws::WsSink;

pub async fn replay(store: &Arc<Store>, task_id: &str, session: &mut SessionRuntime, sink: &WsSink) {
    let records = match store.messages_for_task(task_id).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(task_id, error = %e, "history replay: failed to load messages");
            return;
        }
    };

    sink.send(OutboundMessage::HistoryStart { text: "Loading history…".into() }).await;

    let mut pending_user: Option<String> = None;
    for record in &records {
        if let Some(message) = to_outbound(record) {
            sink.send(message).await;
        }
        match record.kind {
            MessageKind::UserInput => pending_user = Some(record.payload.clone()),
            MessageKind::AgentMessage => {
                if let Some(user_text) = pending_user.take() {
                    session.push_turn(Message::user(user_text), Message::assistant(record.payload.clone()));
                }
            }
            _ => {}
        }
    }

    sink.send(OutboundMessage::HistoryEnd { text: "History loaded.".into() }).await;
}

fn to_outbound(record: &MessageRecord) -> Option<OutboundMessage> {
    match record.kind {
        MessageKind::UserInput => Some(OutboundMessage::StatusMessage {
            text: record.payload.clone(),
            component_hint: "chat-user".into(),
            is_error: false,
        }),
        MessageKind::AgentMessage => Some(OutboundMessage::AgentMessage {
            content: record.payload.clone(),
            component_hint: "chat".into(),
        }),
        MessageKind::SubStatus => Some(OutboundMessage::AgentThinkingUpdate {
            status_key: "history-sub-status".into(),
            sub_type: ThinkingSubType::SubStatus,
            body: ThinkingBody::Message(text_field(&record.payload, "text")),
            component_hint: "thinking".into(),
            details: None,
        }),
        MessageKind::Thought => {
            let label = field(&record.payload, "label").unwrap_or_else(|| "Reasoning".to_string());
            let content_markdown = field(&record.payload, "content_markdown").unwrap_or_default();
            Some(OutboundMessage::AgentThinkingUpdate {
                status_key: "history-thought".into(),
                sub_type: ThinkingSubType::Thought,
                body: ThinkingBody::Labeled { label, content_markdown },
                component_hint: "thinking".into(),
                details: None,
            })
        }
        MessageKind::ToolResultForChat => Some(OutboundMessage::AgentThinkingUpdate {
            status_key: "history-tool-result".into(),
            sub_type: ThinkingSubType::SubStatus,
            body: ThinkingBody::Message(record.payload.clone()),
            component_hint: "chat-tool-card".into(),
            details: None,
        }),
        MessageKind::ConfirmedPlanLog => Some(OutboundMessage::StatusMessage {
            text: record.payload.clone(),
            component_hint: "confirmed-plan-card".into(),
            is_error: false,
        }),
        MessageKind::StatusMessage => Some(OutboundMessage::StatusMessage {
            text: text_field(&record.payload, "text"),
            component_hint: "chat".into(),
            is_error: bool_field(&record.payload, "isError"),
        }),
        // Monitor/error kinds replay to the monitor side-channel only; they
        // never reconstruct chat UI.
        MessageKind::MonitorLog => Some(OutboundMessage::MonitorLog {
            text: text_field(&record.payload, "text"),
            log_source: field(&record.payload, "log_source").unwrap_or_else(|| "history".into()),
        }),
        MessageKind::MonitorError => Some(OutboundMessage::MonitorLog {
            text: record.payload.clone(),
            log_source: "error".into(),
        }),
        MessageKind::MajorStepAnnouncement => None,
    }
}

fn field(payload: &str, key: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get(key).and_then(|f| f.as_str()).map(str::to_string))
}

fn text_field(payload: &str, key: &str) -> String {
    field(payload, key).unwrap_or_else(|| payload.to_string())
}

fn bool_field(payload: &str, key: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get(key).and_then(|f| f.as_bool()))
        .unwrap_or(false)
}
