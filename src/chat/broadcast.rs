//! Broadcast helpers for chat events.
//! Wraps presence and room events in envelopes and hands them to the
//! delivery engine.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ws::broadcast::Broadcaster;
use crate::ws::protocol;

/// Broadcast a confirmed online/offline transition to a fan-out set.
pub fn broadcast_presence(
    broadcaster: &Broadcaster,
    identity: &str,
    online: bool,
    targets: HashSet<i64>,
    at: DateTime<Utc>,
) {
    let envelope = protocol::presence_envelope(identity, online, at);
    broadcaster.broadcast(&envelope, targets);
}

/// Broadcast a room-membership/ownership event on behalf of another service.
/// Same delivery and isolation guarantees as the message fan-out path.
pub fn broadcast_room_event(
    broadcaster: &Broadcaster,
    event: &str,
    payload: Value,
    targets: HashSet<i64>,
) {
    let envelope = protocol::room_event_envelope(event, payload);
    broadcaster.broadcast(&envelope, targets);
}
