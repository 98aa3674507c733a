mod client;
mod frames;

pub use client::WsClient;
pub use frames::{StatusUpdate, WsFrame};
