use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageStatus};

/// A status change pushed by the backend for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message_id: String,
    pub status: MessageStatus,
}

/// Frames exchanged over the WebSocket transport.
///
/// The wire format is a tagged union on `type`. Frames with a tag we do not
/// know decode into `Unknown` and are dropped by the read loop, so protocol
/// additions on the server never break older clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsFrame {
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "message")]
    Message { message: Message },
    #[serde(rename = "status_update")]
    StatusUpdate { update: StatusUpdate },
    #[serde(rename = "typing")]
    Typing { is_typing: bool },
    #[serde(rename = "error")]
    Error { error: String },
    #[serde(other)]
    Unknown,
}
