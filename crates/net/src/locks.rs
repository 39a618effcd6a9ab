// SPDX-License-Identifier: MIT

//! Per-hash single-flight lock: process-global mutual exclusion over a
//! target's `.part` file. Deliberately a plain `HashSet` guarded by a
//! mutex, not a `Mutex` per entry — the lock's lifetime is for the
//! duration of one in-flight download, and a held entry is a cheap
//! idempotent gate afterward, so there is no benefit to per-key
//! fine-graining here.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// A guard that releases its hash's lock when dropped, covering panics and
/// early returns alike.
pub struct LockGuard {
    locks: Arc<Mutex<HashSet<String>>>,
    hash: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.hash);
    }
}

/// Process-wide registry of in-flight download hashes.
#[derive(Clone, Default)]
pub struct DownloadLocks {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl DownloadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the lock for `hash`. Returns `None` if another
    /// caller already holds it.
    pub fn try_acquire(&self, hash: &str) -> Option<LockGuard> {
        let mut set = self.inner.lock();
        if set.insert(hash.to_string()) {
            Some(LockGuard { locks: Arc::clone(&self.inner), hash: hash.to_string() })
        } else {
            None
        }
    }
}
