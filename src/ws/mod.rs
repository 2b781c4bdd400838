//! Live delivery channel: at most one WebSocket connection per online user.
//!
//! The conversation ledger is authoritative; this channel is a best-effort
//! push layer. Delivery over a live connection is at-most-once, and a client
//! that reconnects re-fetches the conversation to recover anything missed
//! while offline. The channel never buffers or retries for offline users.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::Message;
use crate::AppState;

struct Connection {
    conn_id: u64,
    tx: mpsc::UnboundedSender<String>,
}

/// Registry of live connections, latest connection wins per user.
#[derive(Default)]
pub struct DeliveryChannel {
    connections: Mutex<HashMap<i64, Connection>>,
    next_conn_id: AtomicU64,
}

impl DeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `uid`, replacing any prior one. Dropping
    /// the replaced sender ends the previous socket's forward task.
    pub fn connect(
        &self,
        uid: i64,
    ) -> (
        u64,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.connections.lock().unwrap();
        let replaced = connections
            .insert(
                uid,
                Connection {
                    conn_id,
                    tx: tx.clone(),
                },
            )
            .is_some();
        if replaced {
            info!("User {} reconnected, replacing previous connection", uid);
        } else {
            info!("User {} connected", uid);
        }

        (conn_id, tx, rx)
    }

    /// Deregister a connection, but only while `conn_id` still owns the
    /// entry; a stale disconnect must not evict a newer connection.
    pub fn disconnect(&self, uid: i64, conn_id: u64) {
        let mut connections = self.connections.lock().unwrap();
        if connections
            .get(&uid)
            .is_some_and(|conn| conn.conn_id == conn_id)
        {
            connections.remove(&uid);
            info!("User {} disconnected", uid);
        }
    }

    /// Push a stored message to its receiver if online. Returns whether the
    /// push was handed to a live connection; failures evict the dead entry
    /// and are otherwise swallowed, since the ledger already holds the row.
    pub fn deliver(&self, message: &Message) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize message {}: {}", message.id, e);
                return false;
            }
        };

        let mut connections = self.connections.lock().unwrap();
        let Some(connection) = connections.get(&message.receiver_uid) else {
            debug!(
                "User {} offline, message {} stays in the ledger",
                message.receiver_uid, message.id
            );
            return false;
        };

        if connection.tx.send(payload).is_err() {
            connections.remove(&message.receiver_uid);
            warn!("Evicted dead connection for user {}", message.receiver_uid);
            return false;
        }
        true
    }

    pub fn is_online(&self, uid: i64) -> bool {
        self.connections.lock().unwrap().contains_key(&uid)
    }
}

/// GET /ws/{uid} - upgrade to the per-user delivery socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(uid): Path<i64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, uid, state))
}

async fn handle_socket(socket: WebSocket, uid: i64, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, tx, mut rx) = state.channel.connect(uid);

    // Forward pushed messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Keepalive: answer "ping" through the same outbound queue
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) if text.as_str() == "ping" => {
                    if tx.send("pong".to_string()).is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish, then stop the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.channel.disconnect(uid, conn_id);
}
