//! Message router: inbound chat frames → persistence → fan-out → ACK.
//!
//! Invalid frames are dropped with a log line, never answered. A frame that
//! fails persistence or directory lookup produces nothing at all (no partial
//! fan-out, no ACK); the client's reliability layer detects the missing ACK
//! and resyncs.

use std::sync::Arc;

use chrono::Utc;

use crate::state::AppState;
use crate::ws::protocol::{self, MessageKind};
use crate::ws::ConnectionHandle;

/// Route one chat frame from an active connection.
pub async fn handle_chat_frame(state: &AppState, conn: &Arc<ConnectionHandle>, raw: &str) {
    let frame = match protocol::parse_chat_frame(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(
                user_id = conn.user_id(),
                error = %e,
                "dropping unparseable frame"
            );
            return;
        }
    };

    // Anti-spoofing: the claimed sender must be the authenticated identity.
    if frame.sender != conn.identity() {
        tracing::warn!(
            user_id = conn.user_id(),
            claimed = %frame.sender,
            "dropping frame with spoofed sender"
        );
        return;
    }

    let Some(kind) = MessageKind::classify(frame.text.as_deref(), &frame.attachments) else {
        tracing::debug!(user_id = conn.user_id(), "dropping frame with no content");
        return;
    };

    // The store assigns the per-room sequence number; the router never
    // invents ordering.
    let seq = match state
        .store
        .persist_message(
            conn.user_id(),
            &frame.room,
            frame.text.as_deref(),
            &frame.attachments,
        )
        .await
    {
        Ok(seq) => seq,
        Err(e) => {
            tracing::warn!(
                user_id = conn.user_id(),
                room = %frame.room,
                error = %e,
                "failed to persist message, dropping frame"
            );
            return;
        }
    };

    let members = match state.directory.room_members(&frame.room).await {
        Ok(members) => members,
        Err(e) => {
            tracing::warn!(
                user_id = conn.user_id(),
                room = %frame.room,
                error = %e,
                "failed to resolve room members, dropping frame"
            );
            return;
        }
    };

    let envelope = protocol::message_envelope(
        conn.identity(),
        &frame.room,
        seq,
        kind,
        frame.text.as_deref(),
        &frame.attachments,
        Utc::now(),
    );

    // Fan out to everyone in the room except the sender.
    let sender_id = conn.user_id();
    state
        .broadcaster
        .broadcast(&envelope, members.into_iter().filter(|id| *id != sender_id));

    // ACK goes to this connection instance only.
    let ack = protocol::ack_envelope(&frame.temp_id, seq);
    conn.send_envelope(&ack);

    tracing::debug!(
        user_id = sender_id,
        room = %frame.room,
        seq,
        "message routed"
    );
}
