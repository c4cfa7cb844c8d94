use std::sync::{Arc, PoisonError, RwLock};

/// Process-wide credential slot shared by every client.
///
/// Clones share the same token. Only [`login`](Self::login) and
/// [`logout`](Self::logout) mutate it; the transport reads a snapshot when a
/// request is dispatched, so in-flight requests keep the token they started
/// with.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let ctx = Self::new();
        ctx.login(token);
        ctx
    }

    pub fn login(&self, token: impl Into<String>) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.into());
        tracing::debug!("auth token updated");
    }

    pub fn logout(&self) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        tracing::debug!("auth token cleared");
    }

    /// Current token, or `None` when absent or empty.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}
