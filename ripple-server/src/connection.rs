use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message as WsMessage, WebSocketStream};
use tracing::{debug, info, warn};

use ripple_core::transport::{StatusUpdate, WsFrame};
use ripple_core::MessageStatus;

use crate::state::ServerState;

/// Handle a single WebSocket connection.
///
/// `pre_authed` is set when a valid token arrived as a query parameter on
/// the upgrade request; otherwise the client gets ten seconds to send an
/// `auth` frame before the connection is dropped.
pub async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    state: Arc<ServerState>,
    pre_authed: bool,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if !pre_authed && !wait_for_auth(&mut ws_receiver, &state).await {
        warn!(conn_id = %conn_id, "connection closed before authentication");
        return;
    }

    info!(conn_id = %conn_id, "client connected");

    // Channel feeding outbound frames to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.add_client(conn_id.clone(), tx);

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&text, &conn_id, &state);
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!(conn_id = %conn_id, "client sent close frame");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_))) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "websocket error");
                        break;
                    }
                    None => {
                        info!(conn_id = %conn_id, "websocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!(conn_id = %conn_id, "send task finished (connection lost)");
                break;
            }
        }
    }

    send_task.abort();
    state.remove_client(&conn_id);
    info!(conn_id = %conn_id, "client disconnected");
}

/// Wait for a valid `auth` frame from a new connection.
async fn wait_for_auth(
    receiver: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    state: &ServerState,
) -> bool {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(result) = receiver.next().await {
            if let Ok(WsMessage::Text(text)) = result {
                match serde_json::from_str::<WsFrame>(&text) {
                    Ok(WsFrame::Auth { token }) => {
                        if state.verify_token(Some(&token)) {
                            return true;
                        }
                        warn!("authentication failed: invalid token");
                        return false;
                    }
                    Ok(_) => {
                        warn!("expected auth frame first");
                        return false;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to parse auth frame");
                    }
                }
            }
        }
        false
    });

    match timeout.await {
        Ok(result) => result,
        Err(_) => {
            warn!("authentication timeout");
            false
        }
    }
}

/// Handle one inbound frame from an authenticated client.
///
/// Messages are stored, relayed to every other client, and acknowledged to
/// the sender with a `delivered` status update once at least one peer got
/// the relay. Malformed frames are dropped without touching any state.
pub fn handle_frame(text: &str, conn_id: &str, state: &ServerState) {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "dropping malformed frame");
            return;
        }
    };

    match frame {
        WsFrame::Message { message } => {
            let stored = state.store_message(message);

            let relay = WsFrame::Message {
                message: stored.clone(),
            };
            let reached = match serde_json::to_string(&relay) {
                Ok(json) => state.broadcast(&json, Some(conn_id)),
                Err(e) => {
                    warn!(error = %e, "failed to encode relay frame");
                    return;
                }
            };

            if reached > 0 {
                let update = WsFrame::StatusUpdate {
                    update: StatusUpdate {
                        message_id: stored.id.clone(),
                        status: MessageStatus::Delivered,
                    },
                };
                if let Ok(json) = serde_json::to_string(&update) {
                    state.send_to(conn_id, &json);
                }
            }
        }
        WsFrame::Typing { is_typing } => {
            // Ephemeral, relay only.
            debug!(conn_id = %conn_id, is_typing, "relaying typing indicator");
            if let Ok(json) = serde_json::to_string(&WsFrame::Typing { is_typing }) {
                state.broadcast(&json, Some(conn_id));
            }
        }
        WsFrame::Auth { .. } => {
            // Already authenticated, ignore.
        }
        WsFrame::StatusUpdate { .. } | WsFrame::Error { .. } => {
            // Server-originated frames, ignore from clients.
        }
        WsFrame::Unknown => {
            debug!(conn_id = %conn_id, "ignoring frame with unknown type tag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{Message, MessageKind};

    fn text_message(id: &str) -> String {
        let mut msg = Message::outgoing("c1", Some("hi".into()), MessageKind::Text, None, vec![]);
        msg.id = id.to_string();
        serde_json::to_string(&WsFrame::Message { message: msg }).unwrap()
    }

    #[test]
    fn message_frame_is_stored_relayed_and_acked() {
        let state = ServerState::new(None);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        state.add_client("sender".to_string(), tx1);
        state.add_client("peer".to_string(), tx2);

        handle_frame(&text_message("m1"), "sender", &state);

        assert!(state.message("m1").is_some());

        // Peer got the relayed message.
        let relayed: WsFrame = serde_json::from_str(&rx2.try_recv().unwrap()).unwrap();
        assert!(matches!(relayed, WsFrame::Message { message } if message.id == "m1"));

        // Sender got a delivered status update, not the echo.
        let ack: WsFrame = serde_json::from_str(&rx1.try_recv().unwrap()).unwrap();
        match ack {
            WsFrame::StatusUpdate { update } => {
                assert_eq!(update.message_id, "m1");
                assert_eq!(update.status, MessageStatus::Delivered);
            }
            other => panic!("expected status update, got {other:?}"),
        }
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn lone_sender_gets_no_delivered_ack() {
        let state = ServerState::new(None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.add_client("sender".to_string(), tx);

        handle_frame(&text_message("m1"), "sender", &state);

        assert!(state.message("m1").is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_frame_mutates_nothing() {
        let state = ServerState::new(None);
        handle_frame("{not json", "sender", &state);
        handle_frame(r#"{"type":"message"}"#, "sender", &state);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn unknown_tag_is_ignored() {
        let state = ServerState::new(None);
        handle_frame(r#"{"type":"presence","is_online":true}"#, "sender", &state);
        assert!(state.messages().is_empty());
    }
}
