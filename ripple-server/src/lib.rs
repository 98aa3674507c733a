//! Ripple mock backend library.
//!
//! This module exposes the server components for use in integration tests.

mod api;
mod connection;
mod state;

pub use api::router;
pub use connection::handle_connection;
pub use connection::handle_frame;
pub use state::ServerState;
