//! REST surface of the mock backend.
//!
//! - `GET    /messages`                  — list stored messages
//! - `POST   /messages`                  — store a message, ack as `sent`
//! - `POST   /messages/react`            — set/replace a reaction
//! - `DELETE /messages/:id`              — tombstone a message
//! - `POST   /messages/forward`          — store a forwarded copy
//! - `GET    /contacts`                  — list contacts
//! - `POST   /contacts/:id/block`        — flag a contact blocked
//! - `POST   /contacts/:id/archive`      — flag a contact archived
//! - `POST   /contacts/:id/unarchive`    — clear the archived flag
//! - `POST   /contacts/:id/read`         — mark a conversation read
//!
//! Every route expects the bearer credential when one is configured. The
//! widget is served cross-origin, hence the permissive CORS layer.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use ripple_core::{Contact, Message, SELF_ID};

use crate::state::ServerState;

#[derive(Serialize)]
struct Ack {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
}

impl Ack {
    fn ok() -> (StatusCode, Json<Ack>) {
        (
            StatusCode::OK,
            Json(Ack {
                success: true,
                error: None,
                message: None,
            }),
        )
    }

    fn ok_with(message: Message) -> (StatusCode, Json<Ack>) {
        (
            StatusCode::OK,
            Json(Ack {
                success: true,
                error: None,
                message: Some(message),
            }),
        )
    }

    fn failed(status: StatusCode, error: &str) -> (StatusCode, Json<Ack>) {
        (
            status,
            Json(Ack {
                success: false,
                error: Some(error.to_string()),
                message: None,
            }),
        )
    }
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ContactsResponse {
    contacts: Vec<Contact>,
}

#[derive(Deserialize)]
struct StoreMessageBody {
    message: Message,
}

#[derive(Deserialize)]
struct ReactBody {
    message_id: String,
    reaction: String,
}

#[derive(Deserialize)]
struct ForwardBody {
    original_message_id: String,
    #[allow(dead_code)]
    contact_id: String,
    message: Message,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/messages", get(list_messages).post(store_message))
        .route("/messages/react", post(react))
        .route("/messages/forward", post(forward))
        .route("/messages/:id", delete(delete_message))
        .route("/contacts", get(list_contacts))
        .route("/contacts/:id/block", post(block_contact))
        .route("/contacts/:id/archive", post(archive_contact))
        .route("/contacts/:id/unarchive", post(unarchive_contact))
        .route("/contacts/:id/read", post(mark_read))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Check the Authorization header against the configured credential.
fn authorized(state: &ServerState, headers: &HeaderMap) -> bool {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    state.verify_token(token)
}

macro_rules! require_auth {
    ($state:expr, $headers:expr) => {
        if !authorized(&$state, &$headers) {
            return Ack::failed(StatusCode::UNAUTHORIZED, "invalid credentials");
        }
    };
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, StatusCode> {
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(MessagesResponse {
        messages: state.messages(),
    }))
}

async fn store_message(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<StoreMessageBody>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    let stored = state.store_message(body.message);
    Ack::ok_with(stored)
}

async fn react(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<ReactBody>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.apply_reaction(&body.message_id, &body.reaction, SELF_ID) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown message")
    }
}

async fn delete_message(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.delete_message(&id) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown message")
    }
}

async fn forward(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<ForwardBody>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.message(&body.original_message_id).is_none() {
        // The client may forward a message the mock never saw (e.g. created
        // before this process started); accept the copy anyway.
        warn!(original = %body.original_message_id, "forward references unknown original");
    }
    let stored = state.store_message(body.message);
    Ack::ok_with(stored)
}

async fn list_contacts(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<ContactsResponse>, StatusCode> {
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(ContactsResponse {
        contacts: state.contacts(),
    }))
}

async fn block_contact(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.set_blocked(&id) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown contact")
    }
}

async fn archive_contact(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.set_archived(&id, true) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown contact")
    }
}

async fn unarchive_contact(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.set_archived(&id, false) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown contact")
    }
}

async fn mark_read(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<Ack>) {
    require_auth!(state, headers);
    if state.mark_read(&id) {
        Ack::ok()
    } else {
        Ack::failed(StatusCode::NOT_FOUND, "unknown contact")
    }
}
