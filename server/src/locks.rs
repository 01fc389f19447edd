//! Per-session mutual exclusion
//!
//! Every state-changing operation on a session runs while holding that
//! session's lock, so transitions, guess submissions and settlement never
//! interleave. Different sessions never contend.

use shared::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `session_id`. Released when the guard drops.
    pub async fn acquire(&self, session_id: SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(session_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry of a discarded session
    pub async fn forget(&self, session_id: SessionId) {
        self.locks.lock().await.remove(&session_id);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
