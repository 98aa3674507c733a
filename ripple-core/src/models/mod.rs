mod contact;
pub mod input;
mod message;

pub use contact::Contact;
pub use message::{Message, MessageKind, MessageStatus, Reaction, ReplyTo, DELETED_PLACEHOLDER};

/// Sentinel id identifying the local user in sender/receiver fields.
pub const SELF_ID: &str = "me";
