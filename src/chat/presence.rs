//! Presence debouncer.
//!
//! A disconnect does not mean offline: clients drop and reconnect constantly
//! on flaky networks. Instead of broadcasting offline immediately, each
//! disconnect arms a delayed job; a re-authentication inside the window
//! cancels it and nobody is told anything. Jobs that survive the window run
//! on one dedicated serial worker, so offline processing for different users
//! never races internally and the slow parts (last-seen write, directory
//! re-query) stay off the connection tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::broadcast::broadcast_presence;
use crate::directory::MembershipDirectory;
use crate::store::MessageStore;
use crate::ws::broadcast::Broadcaster;

/// What the worker needs to declare one user offline.
struct OfflineJob {
    user_id: i64,
    identity: String,
    room: Option<String>,
    generation: u64,
}

struct PendingOffline {
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    pending: Arc<DashMap<i64, PendingOffline>>,
    job_tx: mpsc::UnboundedSender<OfflineJob>,
    delay: Duration,
    next_generation: AtomicU64,
}

/// Schedules and cancels delayed-offline jobs. Cheap to clone; all clones
/// share one pending map and one worker.
#[derive(Clone)]
pub struct PresenceDebouncer {
    inner: Arc<Inner>,
}

impl PresenceDebouncer {
    pub fn new(
        delay: Duration,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn MembershipDirectory>,
        broadcaster: Broadcaster,
    ) -> Self {
        let pending: Arc<DashMap<i64, PendingOffline>> = Arc::new(DashMap::new());
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(
            job_rx,
            pending.clone(),
            store,
            directory,
            broadcaster,
        ));

        Self {
            inner: Arc::new(Inner {
                pending,
                job_tx,
                delay,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Arm the delayed-offline job for a user who just disconnected.
    /// At most one job is pending per user; re-arming replaces the old one.
    pub fn schedule_offline(&self, user_id: i64, identity: String, room: Option<String>) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let job_tx = self.inner.job_tx.clone();
        let delay = self.inner.delay;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = job_tx.send(OfflineJob {
                user_id,
                identity,
                room,
                generation,
            });
        });

        if let Some(old) = self
            .inner
            .pending
            .insert(user_id, PendingOffline { generation, timer })
        {
            old.timer.abort();
        }
        tracing::debug!(user_id, "offline broadcast scheduled");
    }

    /// Cancel the user's pending job, if any. Returns true when a job was
    /// live, which the caller treats as "this is a reconnection".
    ///
    /// Cancellation is best-effort: a job whose timer already fired is past
    /// aborting, runs to completion on the worker, and cleans up after
    /// itself. The resulting brief offline blip is accepted rather than
    /// risking double bookkeeping.
    pub fn cancel(&self, user_id: i64) -> bool {
        match self.inner.pending.remove(&user_id) {
            Some((_, entry)) => {
                entry.timer.abort();
                tracing::debug!(user_id, "pending offline broadcast cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a delayed-offline job is currently tracked for this user.
    pub fn has_pending(&self, user_id: i64) -> bool {
        self.inner.pending.contains_key(&user_id)
    }
}

/// Single serial worker: jobs execute one at a time, in arrival order.
async fn run_worker(
    mut job_rx: mpsc::UnboundedReceiver<OfflineJob>,
    pending: Arc<DashMap<i64, PendingOffline>>,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn MembershipDirectory>,
    broadcaster: Broadcaster,
) {
    while let Some(job) = job_rx.recv().await {
        fire(job, &pending, &store, &directory, &broadcaster).await;
    }
}

async fn fire(
    job: OfflineJob,
    pending: &DashMap<i64, PendingOffline>,
    store: &Arc<dyn MessageStore>,
    directory: &Arc<dyn MembershipDirectory>,
    broadcaster: &Broadcaster,
) {
    let now = Utc::now();

    match &job.room {
        Some(room) => {
            if let Err(e) = store.record_last_seen(job.user_id, room, now).await {
                tracing::warn!(user_id = job.user_id, error = %e, "failed to record last-seen");
            }
        }
        None => {
            tracing::debug!(user_id = job.user_id, "no last room known, skipping last-seen");
        }
    }

    // Membership may have changed since the disconnect; resolve fresh.
    match directory.fan_out_set(job.user_id).await {
        Ok(targets) => {
            tracing::info!(
                user_id = job.user_id,
                identity = %job.identity,
                recipients = targets.len(),
                "user is offline"
            );
            broadcast_presence(broadcaster, &job.identity, false, targets, now);
        }
        Err(e) => {
            tracing::warn!(user_id = job.user_id, error = %e, "failed to resolve fan-out set");
        }
    }

    // Self-removal, keyed by generation so a newer job for the same user
    // is left alone.
    pending.remove_if(&job.user_id, |_, entry| entry.generation == job.generation);
}
