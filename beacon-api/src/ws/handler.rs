//! WebSocket connection handler.
//!
//! This module provides the WebSocket upgrade handler and message processing.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionId, ConnectionState};
use super::message::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnectionId::generate();
    info!(%conn_id, "New WebSocket connection");

    // Create message channel for this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.websocket.max_queue_size);

    // Register connection; it receives nothing until it subscribes
    let conn_state = state.registry.register(ConnectionState::new(conn_id, tx));

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(msg) => {
                // Update heartbeat on any client traffic
                conn_state.write().update_heartbeat();

                match msg {
                    Message::Text(text) => {
                        handle_text_message(&text, &conn_state).await;
                    }
                    Message::Ping(_) => {
                        // Axum answers with a pong frame automatically
                        debug!(%conn_id, "Received ping frame");
                    }
                    Message::Pong(_) => {
                        debug!(%conn_id, "Received pong frame");
                    }
                    Message::Binary(_) => {
                        warn!(%conn_id, "Ignoring binary frame");
                    }
                    Message::Close(_) => {
                        info!(%conn_id, "WebSocket close requested");
                        break;
                    }
                }
            }
            Err(e) => {
                error!(%conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup
    info!(%conn_id, "WebSocket connection closed");
    state.registry.unregister(conn_id);
    send_task.abort();
}

/// Handles a text message from the client.
async fn handle_text_message(
    text: &str,
    conn_state: &Arc<parking_lot::RwLock<ConnectionState>>,
) {
    let conn_id = conn_state.read().id;

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { filter, utc_offset }) => {
            let sender = {
                let mut state = conn_state.write();
                state.activate(filter, utc_offset);
                state.sender.clone()
            };
            debug!(%conn_id, ?filter, utc_offset, "Subscriber activated");
            let _ = sender.send(ServerMessage::Subscribed { filter }).await;
        }
        Ok(ClientMessage::Ping { timestamp }) => {
            let sender = conn_state.read().sender.clone();
            let msg = ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis(),
            };
            let _ = sender.send(msg).await;
        }
        Err(e) => {
            warn!(%conn_id, error = %e, "Failed to parse client message");
            let error_msg = ServerMessage::Error {
                code: "INVALID_MESSAGE".to_string(),
                message: format!("Failed to parse message: {e}"),
            };
            let sender = conn_state.read().sender.clone();
            let _ = sender.send(error_msg).await;
        }
    }
}
