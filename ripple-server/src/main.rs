use std::sync::Arc;

use ripple_server::{handle_connection, router, ServerState};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ripple_core::Contact;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:9100";
const DEFAULT_WS_ADDR: &str = "0.0.0.0:9101";

/// Contacts the demo starts with; a real deployment would back this with a
/// directory service.
fn demo_contacts() -> Vec<Contact> {
    vec![
        Contact::new("alice", "Alice Moreau"),
        Contact::new("bob", "Bob Keller"),
        Contact::new("carol", "Carol Diaz"),
    ]
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let http_addr = std::env::var("RIPPLE_HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
    let ws_addr = std::env::var("RIPPLE_WS_ADDR").unwrap_or_else(|_| DEFAULT_WS_ADDR.to_string());
    let auth_token = std::env::var("RIPPLE_ACCESS_TOKEN").ok();

    let state = Arc::new(ServerState::new(auth_token));
    state.seed_contacts(demo_contacts());

    // REST surface
    let http_state = state.clone();
    let http_listener = match TcpListener::bind(&http_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            std::process::exit(1);
        }
    };
    info!("Ripple REST API listening on {}", http_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, router(http_state)).await {
            error!("HTTP server error: {}", e);
        }
    });

    // WebSocket relay
    let ws_listener = match TcpListener::bind(&ws_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind WebSocket listener to {}: {}", ws_addr, e);
            std::process::exit(1);
        }
    };
    info!("Ripple relay listening on {}", ws_addr);

    loop {
        match ws_listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New connection from {}", peer_addr);

                let state = state.clone();
                tokio::spawn(async move {
                    // Credential may travel as a `token` query parameter on
                    // the upgrade request; an invalid one rejects the
                    // handshake, a missing one defers to the auth frame.
                    let mut pre_authed = !state.requires_auth();
                    let callback_state = state.clone();
                    let callback = |req: &Request, resp: Response| {
                        match query_token(req.uri().query()) {
                            Some(token) => {
                                if callback_state.verify_token(Some(&token)) {
                                    pre_authed = true;
                                    Ok(resp)
                                } else {
                                    warn!("rejecting upgrade: invalid token");
                                    let mut reject = ErrorResponse::new(Some("invalid token".into()));
                                    *reject.status_mut() = StatusCode::UNAUTHORIZED;
                                    Err(reject)
                                }
                            }
                            None => Ok(resp),
                        }
                    };

                    let handshake = accept_hdr_async(stream, callback).await;
                    match handshake {
                        Ok(ws_stream) => {
                            handle_connection(ws_stream, state, pre_authed).await;
                        }
                        Err(e) => {
                            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Pull the `token` parameter out of a query string.
fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}
