use serde::{Deserialize, Serialize};

use super::SELF_ID;

/// Content shown in place of the original once a message is deleted.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Delivery lifecycle of a message.
///
/// Status only advances along `sending -> sent -> delivered -> read`.
/// `failed` is a parallel terminal state reachable only from `sending`;
/// a failed message is never retried implicitly (see `DeliveryEngine::resend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position in the success-path ordering.
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending | MessageStatus::Failed => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
        }
    }

    /// Whether moving from `self` to `next` is permitted.
    ///
    /// Equal statuses are permitted so repeated updates stay idempotent.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Failed, _) => false,
            (MessageStatus::Sending, MessageStatus::Failed) => true,
            (_, MessageStatus::Failed) => false,
            (current, next) => next.rank() >= current.rank(),
        }
    }

    /// Terminal states have no pending transitions left to schedule.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Media,
    Audio,
    Location,
    Contact,
}

impl MessageKind {
    /// Label used for the contact-list preview when a message has no text.
    pub fn placeholder_label(self) -> &'static str {
        match self {
            MessageKind::Audio => "Voice message",
            _ => "Media message",
        }
    }
}

/// A single emoji reaction. A message holds at most one reaction per user;
/// reacting again replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
}

/// Denormalized snapshot of the message being replied to. Holding a copy
/// rather than a reference lets the reply outlive deletion of the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub id: String,
    pub content: String,
    pub sender_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: Option<String>,
    /// Unix millisecond timestamp.
    pub timestamp: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: MessageStatus,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_forwarded: bool,
}

impl Message {
    /// Build a fresh outgoing message in the `sending` state.
    ///
    /// Ids are v4 uuids; timestamp-derived ids collide under rapid sends.
    pub fn outgoing(
        receiver_id: &str,
        content: Option<String>,
        kind: MessageKind,
        reply_to: Option<ReplyTo>,
        attachments: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            sender_id: SELF_ID.to_string(),
            receiver_id: receiver_id.to_string(),
            status: MessageStatus::Sending,
            kind,
            reactions: Vec::new(),
            reply_to,
            attachments,
            is_deleted: false,
            is_forwarded: false,
        }
    }

    /// Synthesize a forwarded copy addressed to `receiver_id`.
    ///
    /// Content, kind, and attachments carry over; id and timestamp are fresh.
    /// Forwarding a deleted message carries the tombstone placeholder.
    pub fn forwarded(source: &Message, receiver_id: &str) -> Self {
        let mut msg = Self::outgoing(
            receiver_id,
            source.content.clone(),
            source.kind,
            None,
            source.attachments.clone(),
        );
        msg.is_forwarded = true;
        msg
    }

    /// Text used for the contact-list `last_message` projection.
    pub fn preview_text(&self) -> String {
        match &self.content {
            Some(content) if !content.is_empty() => content.clone(),
            _ => self.kind.placeholder_label().to_string(),
        }
    }

    /// Set or replace this user's reaction.
    pub fn apply_reaction(&mut self, emoji: &str, user_id: &str) {
        if let Some(existing) = self.reactions.iter_mut().find(|r| r.user_id == user_id) {
            existing.emoji = emoji.to_string();
        } else {
            self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                user_id: user_id.to_string(),
            });
        }
    }

    /// Mark as deleted in place: id and position are preserved, content is
    /// replaced with the placeholder.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content = Some(DELETED_PLACEHOLDER.to_string());
    }
}
