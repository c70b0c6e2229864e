use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use chrono::Utc;

use crate::auth::token::Claims;
use crate::chat;
use crate::chat::broadcast::broadcast_presence;
use crate::state::AppState;
use crate::ws::protocol::{self, HEARTBEAT_REPLY};
use crate::ws::{self, ConnectionHandle};

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel.
///   Being the only writer is what serializes frames on this wire.
/// - Reader loop: heartbeats and chat frames, everything else ignored.
pub async fn run_connection(socket: WebSocket, state: AppState, claims: Claims) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = Arc::new(ConnectionHandle::new(claims.sub, claims.name, tx));
    ws::register(&state.registry, handle.clone());

    // A live pending-offline job means this user dropped moments ago and is
    // back: cancel the job and stay quiet. Only a genuinely fresh connection
    // announces itself.
    if state.presence.cancel(handle.user_id()) {
        tracing::debug!(
            user_id = handle.user_id(),
            "reconnected inside the offline window"
        );
    } else {
        match state.directory.fan_out_set(handle.user_id()).await {
            Ok(targets) => {
                broadcast_presence(&state.broadcaster, handle.identity(), true, targets, Utc::now());
            }
            Err(e) => {
                tracing::warn!(
                    user_id = handle.user_id(),
                    error = %e,
                    "failed to resolve fan-out set for online broadcast"
                );
            }
        }
    }

    tracing::info!(
        user_id = handle.user_id(),
        identity = %handle.identity(),
        "connection active"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    handle_text_frame(&state, &handle, text.as_str()).await;
                }
                Message::Ping(data) => {
                    handle.send(Message::Pong(data));
                }
                Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::debug!(user_id = handle.user_id(), "ignoring binary frame");
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = handle.user_id(),
                        reason = ?frame,
                        "client initiated close"
                    );
                    break;
                }
            },
            // Abrupt peer disconnects are expected traffic, not failures.
            Some(Err(e)) => {
                tracing::debug!(
                    user_id = handle.user_id(),
                    error = %e,
                    "transport error, treating as close"
                );
                break;
            }
            None => {
                tracing::debug!(user_id = handle.user_id(), "stream ended");
                break;
            }
        }
    }

    writer_handle.abort();

    // Deregister first so no further fan-out targets this connection, then
    // hand presence off to the debouncer instead of declaring offline here.
    ws::deregister(&state.registry, handle.user_id(), handle.conn_id());
    state.presence.schedule_offline(
        handle.user_id(),
        handle.identity().to_string(),
        handle.last_room(),
    );

    tracing::info!(user_id = handle.user_id(), "connection closed");
}

/// Dispatch one inbound text frame. Heartbeats are answered synchronously
/// and never touch persistence; everything else is treated as a chat frame.
async fn handle_text_frame(state: &AppState, handle: &Arc<ConnectionHandle>, text: &str) {
    if let Some(room) = protocol::parse_heartbeat(text) {
        if let Some(room) = room {
            handle.note_room(room);
        }
        handle.send(Message::Text(HEARTBEAT_REPLY.into()));
        return;
    }

    chat::messages::handle_chat_frame(state, handle, text).await;
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
