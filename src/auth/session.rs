//! Recently authorized sessions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Size past which `remember` drops expired sessions first.
const PURGE_THRESHOLD: usize = 1024;

/// Session cookie values that passed a check, each trusted until its expiry.
#[derive(Debug, Clone)]
pub struct SessionCache {
    inner: Arc<DashMap<String, Instant>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// True if `session` was authorized less than `ttl` ago.
    pub fn is_valid(&self, session: &str) -> bool {
        let now = Instant::now();
        let expiry = self.inner.get(session).map(|e| *e);
        match expiry {
            Some(expiry) if expiry > now => true,
            Some(_) => {
                self.inner.remove(session);
                false
            }
            None => false,
        }
    }

    pub fn remember(&self, session: String) {
        if self.ttl.is_zero() {
            return;
        }
        if self.inner.len() >= PURGE_THRESHOLD {
            self.purge_expired();
        }
        self.inner.insert(session, Instant::now() + self.ttl);
    }

    /// Drop expired sessions.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, expiry| *expiry > now);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
