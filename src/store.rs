//! Message store collaborator.
//!
//! The gateway never orders messages itself: the store assigns each persisted
//! message a per-room sequence number, and that number is the ordering
//! contract recipients rely on. The production store lives in the CRUD
//! service; the in-memory implementation here backs tests and standalone runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a chat message and return its assigned sequence number.
    /// Sequence numbers are strictly increasing per room, in persistence order.
    async fn persist_message(
        &self,
        sender_id: i64,
        room: &str,
        text: Option<&str>,
        attachments: &[String],
    ) -> Result<u64, StoreError>;

    /// Record when a user was last seen in a room.
    async fn record_last_seen(
        &self,
        user_id: i64,
        room: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub seq: u64,
    pub sender_id: i64,
    pub text: Option<String>,
    pub attachments: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct RoomLog {
    next_seq: u64,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Clone)]
struct LastSeen {
    room: String,
    at: DateTime<Utc>,
    calls: usize,
}

/// In-memory message store. The sequence counter and the message log for a
/// room live under one map entry, so assignment order and persistence order
/// cannot diverge.
#[derive(Default)]
pub struct MemoryMessageStore {
    rooms: DashMap<String, RoomLog>,
    last_seen: DashMap<i64, LastSeen>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages persisted for a room, in sequence order. Test hook.
    pub fn messages_in(&self, room: &str) -> Vec<StoredMessage> {
        self.rooms
            .get(room)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Last recorded (room, timestamp) for a user. Test hook.
    pub fn last_seen(&self, user_id: i64) -> Option<(String, DateTime<Utc>)> {
        self.last_seen
            .get(&user_id)
            .map(|e| (e.room.clone(), e.at))
    }

    /// How many times `record_last_seen` ran for a user. Test hook.
    pub fn last_seen_calls(&self, user_id: i64) -> usize {
        self.last_seen.get(&user_id).map(|e| e.calls).unwrap_or(0)
    }

    /// Snapshot of per-room sequence high-water marks. Test hook.
    pub fn sequence_marks(&self) -> HashMap<String, u64> {
        self.rooms
            .iter()
            .map(|e| (e.key().clone(), e.value().next_seq))
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist_message(
        &self,
        sender_id: i64,
        room: &str,
        text: Option<&str>,
        attachments: &[String],
    ) -> Result<u64, StoreError> {
        let mut log = self.rooms.entry(room.to_string()).or_default();
        log.next_seq += 1;
        let seq = log.next_seq;
        log.messages.push(StoredMessage {
            seq,
            sender_id,
            text: text.map(|t| t.to_string()),
            attachments: attachments.to_vec(),
            at: Utc::now(),
        });
        Ok(seq)
    }

    async fn record_last_seen(
        &self,
        user_id: i64,
        room: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entry = self.last_seen.entry(user_id).or_insert(LastSeen {
            room: room.to_string(),
            at,
            calls: 0,
        });
        entry.room = room.to_string();
        entry.at = at;
        entry.calls += 1;
        Ok(())
    }
}
