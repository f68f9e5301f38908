//! WebSocket transport: upgrade, per-connection loop, teardown.
//!
//! The transport shuttles JSON frames between the socket and the session;
//! it owns no room state. Each connection gets one task running a select
//! loop over its outbox (room broadcasts and private replies) and the
//! inbound frame stream. Whatever way the loop exits, the session is
//! closed exactly once before the outbox is detached.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::broadcast::Outbox;
use crate::error::ChatError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::Session;
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = ulid::Ulid::new().to_string();
    tracing::info!(conn = %conn_id, "WebSocket connected");

    let (outbox, mut outbound_rx) = Outbox::new();
    state.registry.attach(conn_id.clone(), outbox.clone()).await;
    let mut session = Session::new(conn_id.clone(), state.registry.clone(), outbox);

    let mut close_reason = "connection dropped";

    loop {
        tokio::select! {
            // Deliver queued room broadcasts and private replies
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                close_reason = "send failure";
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }

            // Handle client frames
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(conn = %conn_id, "received frame: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(ack) = session.handle_message(client_msg).await {
                                    if let Ok(json) = serde_json::to_string(&ack) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            close_reason = "send failure";
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!(conn = %conn_id, "Failed to parse client message: {}", e);
                                let ack = ServerMessage::error(&ChatError::Validation(
                                    "Invalid message format".to_string(),
                                ));
                                if let Ok(json) = serde_json::to_string(&ack) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        close_reason = "client closed";
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            close_reason = "send failure";
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(conn = %conn_id, "WebSocket error: {}", e);
                        close_reason = "transport error";
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    session.close(close_reason).await;
    state.registry.detach(&conn_id).await;
    tracing::info!(conn = %conn_id, "WebSocket connection closed");
}
