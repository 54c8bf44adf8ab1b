//! Per-connection outbound queue.
//!
//! Everything a session pushes to its client goes through [`Outbound`]; a dedicated writer task
//! drains the queue into the socket.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use imgdup_core::OutboundMessage;
use tokio::sync::mpsc;

use crate::error::PipelineError;

/// Queue capacity per connection.
pub const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Create a queue and its receiving half.
    pub fn channel() -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        (Self::new(tx), rx)
    }

    /// Queue a message, waiting for room if the writer is behind.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), PipelineError> {
        let action = message.action();
        self.tx.send(message).await.map_err(|_| {
            tracing::warn!(action, "outbound queue closed, message dropped");
            PipelineError::ChannelClosed(action.to_string())
        })
    }

    pub async fn toast(&self, text: &str) -> Result<(), PipelineError> {
        self.send(OutboundMessage::toast(text)).await
    }
}

/// Drain `rx` into `sink` until the queue closes or the socket fails.
pub async fn write_loop<S>(mut rx: mpsc::Receiver<OutboundMessage>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(message) = rx.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(action = message.action(), error = %e, "failed to serialize outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!(error = %e, "socket closed while writing");
            break;
        }
    }
}
