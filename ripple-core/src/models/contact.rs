use serde::{Deserialize, Serialize};

use super::MessageStatus;

/// A chat peer, including the fields projected from its most recent message.
///
/// `last_message` / `last_message_time` / `last_message_status` are derived
/// state, recomputed by the store on every send and receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<i64>,
    #[serde(default)]
    pub last_message_status: Option<MessageStatus>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub is_archived: bool,
}

impl Contact {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            avatar: None,
            last_message: None,
            last_message_time: None,
            last_message_status: None,
            unread_count: 0,
            is_online: false,
            last_seen: None,
            is_blocked: false,
            is_archived: false,
        }
    }
}
