//! Membership directory collaborator.
//!
//! Resolves who should receive a broadcast. Fan-out sets are always resolved
//! at send time, never cached across a disconnect, because membership can
//! change while a user is offline.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("membership directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Everyone who should see this user's presence changes: co-members of
    /// the rooms the user belongs to, excluding the user themself.
    async fn fan_out_set(&self, user_id: i64) -> Result<HashSet<i64>, DirectoryError>;

    /// Current members of a room. May include users that are offline; the
    /// delivery engine skips those.
    async fn room_members(&self, room: &str) -> Result<HashSet<i64>, DirectoryError>;
}

/// In-memory room membership, mutated through the same operations the CRUD
/// layer would use.
#[derive(Default)]
pub struct MemoryDirectory {
    rooms: DashMap<String, HashSet<i64>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_room(&self, room: &str, user_id: i64) {
        self.rooms.entry(room.to_string()).or_default().insert(user_id);
    }

    pub fn leave_room(&self, room: &str, user_id: i64) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&user_id);
        }
    }
}

#[async_trait]
impl MembershipDirectory for MemoryDirectory {
    async fn fan_out_set(&self, user_id: i64) -> Result<HashSet<i64>, DirectoryError> {
        let mut out = HashSet::new();
        for entry in self.rooms.iter() {
            if entry.value().contains(&user_id) {
                out.extend(entry.value().iter().copied());
            }
        }
        out.remove(&user_id);
        Ok(out)
    }

    async fn room_members(&self, room: &str) -> Result<HashSet<i64>, DirectoryError> {
        Ok(self
            .rooms
            .get(room)
            .map(|m| m.clone())
            .unwrap_or_default())
    }
}
