//! Delivery engine: fan an envelope out to a set of users.
//!
//! The envelope is serialized exactly once; every recipient gets the same
//! bytes. Delivery to one target never affects the others: offline targets
//! are skipped, broken transports are logged and skipped. Writes to a single
//! connection are serialized by that connection's writer task, so concurrent
//! broadcasts cannot interleave bytes on one wire.

use axum::extract::ws::Message;

use crate::ws::protocol::Envelope;
use crate::ws::ConnectionRegistry;

/// Process-wide broadcast entry point. Cloneable; non-connection code (room
/// membership services, friend-request handling) holds one of these to push
/// events with the same delivery guarantees as the message fan-out path.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Deliver an envelope to every target user that currently has a live
    /// connection. Absent or closed targets are skipped silently; there is
    /// no retry and no queueing.
    pub fn broadcast<I>(&self, envelope: &Envelope, targets: I)
    where
        I: IntoIterator<Item = i64>,
    {
        let text = match serde_json::to_string(envelope) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize broadcast envelope");
                return;
            }
        };
        let msg = Message::Text(text.into());

        for user_id in targets {
            let Some(handle) = self.registry.get(&user_id) else {
                continue; // offline
            };
            if !handle.send(msg.clone()) {
                tracing::debug!(user_id, "dropped delivery to closed connection");
            }
        }
    }

    /// Deliver an envelope to a single user's registered connection, if any.
    pub fn send_to_user(&self, user_id: i64, envelope: &Envelope) {
        self.broadcast(envelope, [user_id]);
    }
}
