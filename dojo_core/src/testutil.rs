//! Shared fixtures for unit tests.

use crate::clock::ManualClock;
use crate::store::{ContentStore, StoreOptions};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

/// A store under `temp_dir/data` driven by a manual clock.
pub fn test_store(temp_dir: &TempDir) -> (Arc<ManualClock>, ContentStore) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
    ));
    let store = ContentStore::init(
        temp_dir.path().join("data"),
        StoreOptions::default().with_clock(clock.clone()),
    )
    .unwrap();
    (clock, store)
}
