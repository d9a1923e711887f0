//! Connection admission against a runtime-adjustable ceiling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

/// Holds the connection ceiling. Owned by the game loop; only admin
/// commands change it.
#[derive(Debug)]
pub struct AdmissionController {
    max_concurrent_connections: i32,
}

impl AdmissionController {
    pub fn new(max_concurrent_connections: i32) -> Self {
        Self {
            max_concurrent_connections,
        }
    }

    pub fn ceiling(&self) -> i32 {
        self.max_concurrent_connections
    }

    /// Overwrite the ceiling. Negative values are accepted as-is and shut
    /// out every non-admin connection.
    pub fn set_ceiling(&mut self, max: i32) {
        self.max_concurrent_connections = max;
    }

    /// `live_count` includes the connection being decided on. Admins bypass
    /// the ceiling.
    pub fn decide(&self, live_count: usize, admin: bool) -> Admission {
        if live_count as i64 > self.max_concurrent_connections as i64 && !admin {
            Admission::Rejected
        } else {
            Admission::Admitted
        }
    }
}

/// Live WebSocket connection count, admitted or not.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count a connection until the returned guard is dropped.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            registry: Arc::clone(self),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Keeps one connection counted in its [`ConnectionRegistry`].
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.live.fetch_sub(1, Ordering::SeqCst);
    }
}
