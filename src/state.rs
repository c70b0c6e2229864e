use std::sync::Arc;
use std::time::Duration;

use crate::auth::cache::CredentialCache;
use crate::chat::presence::PresenceDebouncer;
use crate::directory::MembershipDirectory;
use crate::store::MessageStore;
use crate::ws::broadcast::Broadcaster;
use crate::ws::{self, ConnectionRegistry};

/// Shared application state. Connections are created by the transport layer
/// outside any DI container, so every collaborator they need is carried here
/// and handed over explicitly at upgrade time.
#[derive(Clone)]
pub struct AppState {
    /// Live connections, one per user
    pub registry: ConnectionRegistry,
    /// Process-wide delivery engine over the registry
    pub broadcaster: Broadcaster,
    /// Delayed-offline scheduler
    pub presence: PresenceDebouncer,
    /// Message persistence / sequencing collaborator
    pub store: Arc<dyn MessageStore>,
    /// Room membership collaborator
    pub directory: Arc<dyn MembershipDirectory>,
    /// Currently-valid access token per user
    pub tokens: Arc<dyn CredentialCache>,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
}

impl AppState {
    /// Wire up the gateway around its collaborators. Spawns the presence
    /// worker, so this must run inside a tokio runtime.
    pub fn new(
        jwt_secret: Vec<u8>,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn MembershipDirectory>,
        tokens: Arc<dyn CredentialCache>,
        offline_debounce: Duration,
    ) -> Self {
        let registry = ws::new_connection_registry();
        let broadcaster = Broadcaster::new(registry.clone());
        let presence = PresenceDebouncer::new(
            offline_debounce,
            store.clone(),
            directory.clone(),
            broadcaster.clone(),
        );

        Self {
            registry,
            broadcaster,
            presence,
            store,
            directory,
            tokens,
            jwt_secret,
        }
    }
}
