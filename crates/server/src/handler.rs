//! WebSocket session handling.
//!
//! Each connection gets a reader loop that dispatches text frames one at a time, in arrival order,
//! and a writer task draining the connection's outbound queue.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use imgdup_core::protocol::{CONNECTED_ACK, FIND_DUPLICATE_IMAGES};
use imgdup_core::{Inbound, InboundEnvelope, OutboundMessage};

use crate::actions::find_duplicate_images_impl;
use crate::outbound::{Outbound, write_loop};
use crate::state::AppState;

/// `/` serves the WebSocket protocol, `/health` the liveness check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// WebSocket endpoint.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = sink.send(Message::Text(CONNECTED_ACK.to_string())).await {
        tracing::debug!(error = %e, "client left before acknowledgment");
        return;
    }
    tracing::info!("client connected");

    let (outbound, rx) = Outbound::channel();
    let writer = tokio::spawn(write_loop(rx, sink));
    let session = Session::new(state, outbound);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(data)) => tracing::warn!(bytes = data.len(), "ignoring binary frame"),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(error = %e, "socket read failed");
                break;
            }
        }
    }

    drop(session);
    let _ = writer.await;
    tracing::info!("client disconnected");
}

/// Dispatcher for one connection.
pub struct Session {
    state: AppState,
    outbound: Outbound,
}

impl Session {
    pub fn new(state: AppState, outbound: Outbound) -> Self {
        Self { state, outbound }
    }

    /// Handle one text frame. Bad messages are logged and ignored.
    pub async fn handle_text(&self, text: &str) {
        match Inbound::parse(text) {
            Inbound::VersionQuery => {
                let reply = OutboundMessage::VersionResult(env!("CARGO_PKG_VERSION").to_string());
                if let Err(e) = self.outbound.send(reply).await {
                    tracing::warn!(error = %e, "failed to answer version query");
                }
            }
            Inbound::Action(envelope) => self.dispatch(envelope).await,
            Inbound::Unrecognized(raw) => {
                tracing::warn!(message = %truncate(&raw, 200), "ignoring unrecognized message");
            }
        }
    }

    async fn dispatch(&self, envelope: InboundEnvelope) {
        let InboundEnvelope { action, data } = envelope;
        let Some(action) = action else {
            tracing::warn!("ignoring message without action");
            return;
        };
        let Some(data) = data else {
            tracing::warn!(action = %action, "ignoring message without data");
            return;
        };

        match action.as_str() {
            FIND_DUPLICATE_IMAGES => {
                let result = find_duplicate_images_impl(
                    &self.state.pipeline,
                    data,
                    &self.outbound,
                    self.state.config.default_threshold,
                )
                .await;
                match result {
                    Ok(outcome) => tracing::debug!(
                        action = %action,
                        stage = %outcome.stage,
                        delivered = outcome.result.is_some(),
                        "request finished"
                    ),
                    Err(e) => tracing::warn!(action = %action, error = %e, "request rejected"),
                }
            }
            other => tracing::warn!(action = %other, "ignoring unknown action"),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
