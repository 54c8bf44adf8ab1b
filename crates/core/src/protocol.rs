//! WebSocket message types.
//!
//! Every structured message is a JSON object `{ "action": ..., "data": ... }`. Control messages
//! (the connection acknowledgment and the version query) are plain text frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::ClusterResult;

/// Plain text frame sent as soon as a client connects.
pub const CONNECTED_ACK: &str = "connected";

/// Plain text frame asking for the server version.
pub const VERSION_QUERY: &str = "version";

/// Action name of the clustering request.
pub const FIND_DUPLICATE_IMAGES: &str = "find_duplicate_images";

/// Structured inbound message before dispatch.
///
/// Both fields are optional on the wire so that malformed envelopes can be logged precisely
/// instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Messages pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Human readable status update shown by the client.
    Toast(String),

    /// Final clustering for one request.
    FindDuplicateImagesResult(ClusterResult),

    /// Reply to a version query.
    VersionResult(String),
}

impl OutboundMessage {
    /// Create a toast message.
    pub fn toast(message: impl Into<String>) -> Self {
        OutboundMessage::Toast(message.into())
    }

    pub fn action(&self) -> &'static str {
        match self {
            OutboundMessage::Toast(_) => "toast",
            OutboundMessage::FindDuplicateImagesResult(_) => "find_duplicate_images_result",
            OutboundMessage::VersionResult(_) => "version_result",
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A text frame classified by shape.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// `{ "action": ..., "data": ... }`
    Action(InboundEnvelope),
    /// Recognised plain text control message.
    VersionQuery,
    /// Anything else.
    Unrecognized(String),
}

impl Inbound {
    /// Classify a text frame.
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case(VERSION_QUERY) {
            return Inbound::VersionQuery;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => match serde_json::from_value::<InboundEnvelope>(value) {
                Ok(envelope) => Inbound::Action(envelope),
                Err(_) => Inbound::Unrecognized(text.to_string()),
            },
            _ => Inbound::Unrecognized(text.to_string()),
        }
    }
}
