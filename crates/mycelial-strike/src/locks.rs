//! Keyed mutual exclusion.
//!
//! Every change to a user's behavior record or strikes happens while holding
//! that user's lock, so a behavior update and its de-escalation checks never
//! interleave with another update, activation or override for the same user.
//! The engine keeps a second table keyed by alert id for deliveries.
//! Entries are dropped once no caller holds or waits on them.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(user_id.to_string()).or_default().value())
    }

    /// Run `f` while holding the lock for `user_id`.
    pub fn with_user<T>(&self, user_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(user_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        // The map's own reference is the only one left when nobody is queued.
        self.locks.remove_if(user_id, |_, l| Arc::strong_count(l) == 1);
        result
    }

    pub fn tracked_users(&self) -> usize {
        self.locks.len()
    }
}
