use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};
use url::Url;

use super::frames::WsFrame;
use crate::engine::DeliveryEngine;
use crate::error::TransportError;

/// Delay between reconnection attempts after an abnormal closure.
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// WebSocket client for the Transport Collaborator.
///
/// Inbound `message` and `status_update` frames are dispatched into the
/// delivery engine; malformed or unknown frames are logged and dropped.
/// The client reconnects with a fixed delay for as long as the connection
/// keeps closing abnormally, and stops only on [`disconnect`].
///
/// [`disconnect`]: WsClient::disconnect
pub struct WsClient {
    endpoint: String,
    auth_token: String,
    write_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<TokioMutex<bool>>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl WsClient {
    pub fn new(endpoint: &str, auth_token: &str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            endpoint: endpoint.to_string(),
            auth_token: auth_token.to_string(),
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(TokioMutex::new(false)),
            shutdown_tx,
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    fn write_tx_guard(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<WriteMessage>>> {
        match self.write_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Connect and run the read loop, dispatching inbound frames into the
    /// engine. Returns immediately; the connection lives on a spawned task.
    pub fn connect(&self, engine: Arc<DeliveryEngine>) -> Result<(), TransportError> {
        // Credential travels as a query parameter; the auth frame on open
        // carries it again for backends that only read the first frame.
        let mut url = Url::parse(&self.endpoint)?;
        url.query_pairs_mut().append_pair("token", &self.auth_token);

        let auth_token = self.auth_token.clone();
        let write_tx = self.write_tx.clone();
        let connected = self.connected.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                // Check for shutdown before attempting connection
                if shutdown_rx.try_recv().is_ok() {
                    info!("shutdown signal received, stopping reconnection");
                    break;
                }

                info!(url = %url, "connecting to chat server");

                match connect_async(url.as_str()).await {
                    Ok((ws_stream, _)) => {
                        info!("connected to chat server");
                        *connected.lock().await = true;

                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        // Authenticate on open
                        let auth = WsFrame::Auth {
                            token: auth_token.clone(),
                        };
                        let auth_json = match serde_json::to_string(&auth) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(error = %e, "failed to encode auth frame");
                                *connected.lock().await = false;
                                break;
                            }
                        };
                        if ws_write.send(WsMessage::Text(auth_json.into())).await.is_err() {
                            error!("failed to send auth frame");
                            *connected.lock().await = false;
                            tokio::time::sleep(RECONNECT_DELAY).await;
                            continue;
                        }

                        // Create channel for outgoing frames
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        {
                            let mut guard = match write_tx.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            *guard = Some(tx);
                        }

                        // Frame loop
                        let mut should_reconnect = true;
                        loop {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("shutdown signal received, closing connection gracefully");
                                    if let Err(e) = ws_write.send(WsMessage::Close(None)).await {
                                        warn!(error = %e, "failed to send close frame");
                                    }
                                    should_reconnect = false;
                                    break;
                                }
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(WsMessage::Text(data.into())).await.is_err() {
                                                error!("failed to send frame to server");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            info!("close requested, sending close frame");
                                            if let Err(e) = ws_write.send(WsMessage::Close(None)).await {
                                                warn!(error = %e, "failed to send close frame");
                                            }
                                            should_reconnect = false;
                                            break;
                                        }
                                    }
                                }
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(WsMessage::Text(text))) => {
                                            dispatch_frame(&engine, &text);
                                        }
                                        Some(Ok(WsMessage::Close(frame))) => {
                                            // Only an abnormal closure warrants a
                                            // reconnect; code 1000 is deliberate.
                                            let normal = frame
                                                .as_ref()
                                                .map(|f| f.code == CloseCode::Normal)
                                                .unwrap_or(false);
                                            if normal {
                                                info!("server closed connection normally");
                                                should_reconnect = false;
                                            } else {
                                                warn!(close = ?frame, "server closed connection abnormally");
                                            }
                                            break;
                                        }
                                        None => {
                                            info!("server dropped the connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "websocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        // Cleanup
                        {
                            let mut guard = match write_tx.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            *guard = None;
                        }
                        *connected.lock().await = false;
                        info!("disconnected from chat server");

                        if !should_reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, url = %url, "failed to connect to chat server");
                    }
                }

                debug!("reconnecting in {:?}", RECONNECT_DELAY);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        Ok(())
    }

    /// Gracefully disconnect. No reconnection follows a deliberate close.
    pub fn disconnect(&self) {
        info!("initiating graceful disconnect");
        let _ = self.shutdown_tx.send(());
        if let Some(tx) = self.write_tx_guard().as_ref() {
            let _ = tx.send(WriteMessage::Close);
        }
    }

    /// Send a frame, gated on the channel being open.
    pub fn send(&self, frame: &WsFrame) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame)?;
        debug!(len = json.len(), "sending frame to server");

        let guard = self.write_tx_guard();
        match guard.as_ref() {
            Some(tx) if tx.send(WriteMessage::Data(json)).is_ok() => Ok(()),
            _ => {
                warn!("cannot send frame: not connected to server");
                Err(TransportError::NotConnected)
            }
        }
    }

    pub fn send_message(&self, message: &crate::models::Message) -> Result<(), TransportError> {
        self.send(&WsFrame::Message {
            message: message.clone(),
        })
    }

    pub fn send_typing(&self, is_typing: bool) -> Result<(), TransportError> {
        self.send(&WsFrame::Typing { is_typing })
    }
}

/// Decode one inbound frame and route it into the engine.
fn dispatch_frame(engine: &DeliveryEngine, text: &str) {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping malformed frame");
            return;
        }
    };

    match frame {
        WsFrame::Message { message } => {
            if !engine.receive(message) {
                debug!("dropped duplicate inbound message");
            }
        }
        WsFrame::StatusUpdate { update } => {
            if let Err(e) = engine.apply_status_update(&update.message_id, update.status) {
                warn!(message_id = %update.message_id, error = %e, "status update for unknown message");
            }
        }
        WsFrame::Error { error } => {
            error!(server_error = %error, "server reported an error");
        }
        WsFrame::Auth { .. } | WsFrame::Typing { .. } => {
            // Outbound-only frames; a server echoing them is harmless.
        }
        WsFrame::Unknown => {
            debug!("ignoring frame with unknown type tag");
        }
    }
}
