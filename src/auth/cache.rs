use dashmap::DashMap;

/// Server-side cache of the currently-valid access token per user.
///
/// The connection handler cross-checks every presented credential against
/// this cache, so a stale token that still passes signature/expiry checks
/// (e.g. one rotated away after a refresh) cannot open a connection. The
/// surrounding application updates the cache whenever it issues a token.
pub trait CredentialCache: Send + Sync {
    /// The access token currently considered valid for this user, if any.
    fn current_token(&self, user_id: i64) -> Option<String>;

    /// Record a freshly issued access token as the valid one for this user.
    fn store_token(&self, user_id: i64, token: String);

    /// Forget the user's token (logout / ban).
    fn revoke(&self, user_id: i64);
}

/// In-process credential cache backed by a concurrent map.
#[derive(Default)]
pub struct MemoryCredentialCache {
    tokens: DashMap<i64, String>,
}

impl MemoryCredentialCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialCache for MemoryCredentialCache {
    fn current_token(&self, user_id: i64) -> Option<String> {
        self.tokens.get(&user_id).map(|t| t.clone())
    }

    fn store_token(&self, user_id: i64, token: String) {
        self.tokens.insert(user_id, token);
    }

    fn revoke(&self, user_id: i64) {
        self.tokens.remove(&user_id);
    }
}
