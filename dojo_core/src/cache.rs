//! Time-boxed read cache for parsed sidecar records.

use crate::clock::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Caches parsed records by file path for a bounded window.
///
/// Readers may observe a value up to `ttl` old after a write made outside
/// this process. Writes made through the store invalidate explicitly.
#[derive(Debug)]
pub struct MetadataCache<T> {
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<PathBuf, (DateTime<Utc>, T)>>,
}

impl<T: Clone> MetadataCache<T> {
    /// Create a cache. A zero `ttl` disables caching.
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether lookups can ever hit.
    pub fn is_enabled(&self) -> bool {
        self.ttl > TimeDelta::zero()
    }

    /// Fetch a live entry, evicting it if expired.
    pub fn get(&self, path: &Path) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(path) {
            Some((stored_at, value)) if now - *stored_at < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(path);
                None
            }
            None => None,
        }
    }

    /// Store a value stamped with the current time.
    /// Expired entries are swept on the way in.
    pub fn insert(&self, path: PathBuf, value: T) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (stored_at, _)| now - *stored_at < self.ttl);
        entries.insert(path, (now, value));
    }

    /// Drop one entry.
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Drop every entry at or below `dir`.
    pub fn invalidate_under(&self, dir: &Path) {
        self.entries.lock().retain(|path, _| !path.starts_with(dir));
    }

    /// Number of stored entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
