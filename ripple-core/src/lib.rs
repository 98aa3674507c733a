//! Ripple core: the client-side message delivery engine.
//!
//! The engine keeps an optimistic in-memory view of messages and contacts,
//! advances each message through the `sending -> sent -> delivered -> read`
//! lifecycle, and reconciles local state against acknowledgements arriving
//! over the WebSocket transport or from scheduled progression timers. The
//! backend is reached through two collaborators: a REST persistence API
//! ([`api::Persistence`]) and a reconnecting WebSocket client
//! ([`transport::WsClient`]).

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;
pub mod transport;

pub use engine::DeliveryEngine;
pub use error::{ApiError, EngineError, TransportError};
pub use models::{Contact, Message, MessageKind, MessageStatus, Reaction, ReplyTo, SELF_ID};
pub use store::ChatStore;
