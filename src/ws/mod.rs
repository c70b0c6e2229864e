pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use std::sync::{Arc, Mutex};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::Envelope;

/// Sender half of a connection's outbound channel. The receiving end is
/// drained by a single writer task per connection, which is what serializes
/// writes to the underlying transport.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Connection registry: at most one live connection per user. A fresh
/// authentication for a user that already has an entry simply overwrites it.
/// The shadowed connection stays open until it closes on its own.
pub type ConnectionRegistry = Arc<DashMap<i64, Arc<ConnectionHandle>>>;

pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}

/// Opaque handle to one live connection.
pub struct ConnectionHandle {
    user_id: i64,
    identity: String,
    conn_id: Uuid,
    sender: ConnectionSender,
    /// Last room the client reported via a heartbeat suffix. Used as the
    /// "where were they" hint for the last-seen record on disconnect.
    last_room: Mutex<Option<String>>,
}

impl ConnectionHandle {
    pub fn new(user_id: i64, identity: String, sender: ConnectionSender) -> Self {
        Self {
            user_id,
            identity,
            conn_id: Uuid::now_v7(),
            sender,
            last_room: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unique id of this connection instance. Distinguishes a stale
    /// connection's close path from a newer connection for the same user.
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a frame for this connection. Returns false when the transport
    /// is already gone; callers treat that as "recipient offline" and move on.
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }

    /// Serialize an envelope and queue it for this connection only.
    /// Used for the per-sender ACK, which must not go through a registry
    /// lookup (a racing reconnect would steal it).
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match serde_json::to_string(envelope) {
            Ok(text) => self.send(Message::Text(text.into())),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn note_room(&self, room: &str) {
        if let Ok(mut last) = self.last_room.lock() {
            *last = Some(room.to_string());
        }
    }

    pub fn last_room(&self) -> Option<String> {
        self.last_room.lock().ok().and_then(|r| r.clone())
    }
}

/// Insert a freshly authenticated connection. Overwrites any previous entry
/// for the user; the old connection is not closed by the server.
pub fn register(registry: &ConnectionRegistry, handle: Arc<ConnectionHandle>) {
    let user_id = handle.user_id();
    registry.insert(user_id, handle);
    tracing::debug!(user_id, "connection registered");
}

/// Remove a connection's registry entry, but only if the entry still belongs
/// to this connection instance. A fast reconnect replaces the entry before
/// the old connection's close path runs; that close must not delete the
/// newer connection's entry.
pub fn deregister(registry: &ConnectionRegistry, user_id: i64, conn_id: Uuid) {
    registry.remove_if(&user_id, |_, handle| handle.conn_id() == conn_id);
    tracing::debug!(user_id, "connection deregistered");
}
