// SPDX-License-Identifier: MIT

//! TTL (+ optional weight) session cache: sessions are cached keyed by
//! file path with a TTL, and eviction is by age and optional weight.
//! Caching is an optimization, not a contract — a miss just reopens.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inferd_core::{Clock, DaemonError, SystemClock};

use crate::session::{InferenceEngine, Session};

struct Entry {
    session: Arc<dyn Session>,
    opened_at: Instant,
    weight: usize,
}

/// Caches open sessions keyed by their model's on-disk path. A lookup that
/// finds an entry older than `ttl` evicts it and opens fresh, same as a
/// miss — this cache never serves a session past its TTL even under
/// concurrent access, since eviction happens inline with the lookup that
/// would otherwise have reused it.
///
/// Generic over the clock so eviction timing can be driven deterministically
/// under test with `FakeClock` instead of real sleeps; production code gets
/// `SystemClock` by default.
pub struct SessionCache<E, C = SystemClock> {
    engine: E,
    clock: C,
    ttl: Duration,
    max_weight: Option<usize>,
    entries: parking_lot::Mutex<HashMap<PathBuf, Entry>>,
}

impl<E: InferenceEngine> SessionCache<E, SystemClock> {
    pub fn new(engine: E, ttl: Duration) -> Self {
        Self::with_clock(engine, ttl, SystemClock)
    }
}

impl<E: InferenceEngine, C: Clock> SessionCache<E, C> {
    pub fn with_clock(engine: E, ttl: Duration, clock: C) -> Self {
        Self { engine, clock, ttl, max_weight: None, entries: parking_lot::Mutex::new(HashMap::new()) }
    }

    pub fn with_max_weight(mut self, max_weight: usize) -> Self {
        self.max_weight = Some(max_weight);
        self
    }

    /// Get a session for `path`, opening (and caching) it if absent or
    /// expired. `weight` is an implementation-chosen cost (e.g. the model
    /// file's byte size) used only for the optional weight-based eviction.
    pub fn get_or_open(&self, path: &Path, weight: usize) -> Result<Arc<dyn Session>, DaemonError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(path) {
            if self.clock.now().duration_since(entry.opened_at) < self.ttl {
                return Ok(Arc::clone(&entry.session));
            }
            entries.remove(path);
        }

        tracing::debug!(path = %path.display(), "opening inference session");
        let session = self.engine.open_session(path)?;
        entries.insert(
            path.to_path_buf(),
            Entry { session: Arc::clone(&session), opened_at: self.clock.now(), weight },
        );
        self.evict_by_weight(&mut entries);
        Ok(session)
    }

    fn evict_by_weight(&self, entries: &mut HashMap<PathBuf, Entry>) {
        let Some(max_weight) = self.max_weight else { return };
        loop {
            let total: usize = entries.values().map(|e| e.weight).sum();
            if total <= max_weight || entries.len() <= 1 {
                return;
            }
            let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.opened_at)
                .map(|(path, _)| path.clone())
            else {
                return;
            };
            tracing::debug!(path = %oldest_key.display(), "evicting session over weight cap");
            entries.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
