use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Note that a submission failure is not an error from the caller's point of
/// view: the message transitions to `failed` and the call itself succeeds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    #[error("unknown contact: {0}")]
    UnknownContact(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors from the persistence API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request: {0}")]
    Rejected(String),
}

/// Errors from the WebSocket transport client.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("transport is not connected")]
    NotConnected,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
