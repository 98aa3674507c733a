//! Input DTOs with garde validation for engine operations.
//!
//! These structs validate caller-supplied data before the engine mutates
//! any local state.

use garde::Validate;
use serde::Deserialize;

use super::{MessageKind, ReplyTo};
use crate::error::EngineError;

/// Validation constants
const MAX_CONTACT_ID_LENGTH: usize = 128;
const MAX_MESSAGE_ID_LENGTH: usize = 128;
const MAX_MESSAGE_LENGTH: usize = 10000;
const MAX_EMOJI_LENGTH: usize = 32;
const MAX_ATTACHMENTS: usize = 32;
const MAX_FORWARD_TARGETS: usize = 64;

/// Input for sending a message.
///
/// Content may be empty when attachments are present; the engine treats a
/// fully empty input as a no-op rather than an error.
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(max = MAX_MESSAGE_LENGTH))]
    pub content: String,
    #[garde(skip)]
    pub kind: MessageKind,
    #[garde(skip)]
    pub reply_to: Option<ReplyTo>,
    #[garde(length(max = MAX_ATTACHMENTS))]
    pub attachments: Vec<String>,
}

impl SendMessageInput {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            kind: MessageKind::Text,
            reply_to: None,
            attachments: Vec::new(),
        }
    }
}

/// Input for reacting to a message.
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(()))]
pub struct ReactInput {
    #[garde(length(min = 1, max = MAX_MESSAGE_ID_LENGTH))]
    pub message_id: String,
    #[garde(length(min = 1, max = MAX_EMOJI_LENGTH))]
    pub emoji: String,
    #[garde(length(min = 1, max = MAX_CONTACT_ID_LENGTH))]
    pub user_id: String,
}

/// Input for forwarding a message to one or more contacts.
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(()))]
pub struct ForwardMessageInput {
    #[garde(length(min = 1, max = MAX_MESSAGE_ID_LENGTH))]
    pub message_id: String,
    #[garde(length(min = 1, max = MAX_FORWARD_TARGETS))]
    pub contact_ids: Vec<String>,
}

/// Helper trait to convert garde validation errors into engine errors.
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), EngineError>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), EngineError> {
        self.validate()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))
    }
}
