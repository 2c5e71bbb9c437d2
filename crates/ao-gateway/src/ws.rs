//! WebSocket transport (§6): one connection per session. Frames in both
//! directions are `{"type", "content"}` JSON envelopes; `OutboundMessage`
//! owns the shape on the way out, `dispatcher::InboundEnvelope` on the way
//! in.

use std::sync::Arc;
use std::time::Duration;

use ao_domain::outbound::OutboundMessage;
use ao_domain::trace::TraceEvent;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::dispatcher::{self, InboundEnvelope};
use crate::session::SessionRuntime;
use crate::state::AppState;

/// Forwards every outbound event into the connection's writer task. The
/// pipeline's `CallbackFanout` and the dispatcher's own catalog/history
/// pushes share this one sink per connection.
pub struct WsSink {
    tx: mpsc::Sender<OutboundMessage>,
}

impl WsSink {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, message: OutboundMessage) {
        if self.tx.send(message).await.is_err() {
            tracing::debug!("ws sink: channel closed, dropping outbound message");
        }
    }
}

#[async_trait::async_trait]
impl ao_pipeline::EventSink for WsSink {
    async fn send(&self, message: OutboundMessage) {
        WsSink::send(self, message).await
    }
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);

    let channel = state.config.server.channel.clone();
    let ping_interval = Duration::from_secs(channel.ping_interval_secs);
    let read_idle_timeout = Duration::from_secs(channel.ping_interval_secs + channel.ping_timeout_secs);

    // Writer task owns the sink and doubles as the keepalive clock: every
    // tick it sends a WS-level ping, independent of outbound traffic.
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(message) => {
                            let text = message.to_envelope().to_string();
                            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if ws_sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    let sink = Arc::new(WsSink::new(tx));
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut session = SessionRuntime::new(session_id.clone(), state.config.pipeline.memory_window);

    TraceEvent::SessionResolved { session_id: session_id.clone(), is_new: true }.emit();
    sink.send(OutboundMessage::StatusMessage {
        text: "Connected.".into(),
        component_hint: "chat".into(),
        is_error: false,
    })
    .await;
    dispatcher::push_available_models(&state, &sink).await;

    tracing::info!(session_id = %session_id, "websocket session opened");

    let max_message_bytes = state.config.server.channel.max_message_bytes;

    loop {
        let next = match tokio::time::timeout(read_idle_timeout, ws_receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::info!(session_id = %session_id, "no client activity within the ping timeout, closing");
                break;
            }
        };
        match next {
            Some(Ok(WsMessage::Text(text))) => {
                if text.len() > max_message_bytes {
                    tracing::warn!(session_id = %session_id, len = text.len(), max_message_bytes, "inbound message exceeds size limit, dropping");
                    sink.send(OutboundMessage::StatusMessage {
                        text: format!("message exceeds the {max_message_bytes}-byte limit"),
                        component_hint: "chat".into(),
                        is_error: true,
                    })
                    .await;
                    continue;
                }
                let envelope: InboundEnvelope = match serde_json::from_str(&text) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "malformed inbound envelope");
                        sink.send(OutboundMessage::StatusMessage {
                            text: format!("malformed message: {e}"),
                            component_hint: "chat".into(),
                            is_error: true,
                        })
                        .await;
                        continue;
                    }
                };
                dispatcher::dispatch(&state, &mut session, &sink, envelope).await;
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "websocket read error");
                break;
            }
        }
    }

    state.cancel_map.cancel(session.cancel_key());
    writer.abort();
    tracing::info!(session_id = %session_id, "websocket session closed");
}
