//! Reconciliation of `files.json` against an exercise's `media/` directory.
//!
//! The directory listing is ground truth. The sidecar only contributes the
//! per-file description, so entries for vanished files are pruned and new
//! files get a blank entry.

use crate::error::{Error, Result};
use crate::meta::{self, FileMeta, FilesData, FILES_SIDECAR};
use crate::path::MEDIA_DIR;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries dropped because their file is gone.
    pub removed: usize,
    /// Entries created for files the sidecar did not know.
    pub added: usize,
}

impl SyncStats {
    /// Whether the sidecar needs rewriting.
    pub fn changed(&self) -> bool {
        self.removed > 0 || self.added > 0
    }
}

/// Bring a sidecar into agreement with the actual media listing.
///
/// Surviving entries keep their order; new entries are appended in name
/// order with `now` as both timestamps.
pub fn reconcile(
    mut sidecar: FilesData,
    actual: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> (FilesData, SyncStats) {
    let before = sidecar.files.len();
    sidecar.files.retain(|f| actual.contains(&f.file_name));
    // Duplicate keys in a hand-edited sidecar collapse to the first entry
    let mut seen = BTreeSet::new();
    sidecar.files.retain(|f| seen.insert(f.file_name.clone()));
    let removed = before - sidecar.files.len();

    let mut added = 0;
    for name in actual {
        if !seen.contains(name) {
            sidecar.files.push(FileMeta::new(name.clone(), now));
            added += 1;
        }
    }

    (sidecar, SyncStats { removed, added })
}

/// Names of the regular files directly inside `exercise_dir/media`.
///
/// A missing media directory is an empty listing.
pub fn list_media(exercise_dir: &Path) -> Result<BTreeSet<String>> {
    let media_dir = exercise_dir.join(MEDIA_DIR);
    let mut names = BTreeSet::new();

    let entries = match fs::read_dir(&media_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            // Removed while listing
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => {
                debug!(name = ?raw, "skipping non UTF-8 media file name");
            }
        }
    }

    Ok(names)
}

/// Load the sidecar, starting empty when it does not exist.
pub fn load_sidecar(exercise_dir: &Path) -> Result<FilesData> {
    Ok(meta::read_optional(&exercise_dir.join(FILES_SIDECAR))?.unwrap_or_default())
}

/// Run one reconciliation pass for a directory, persisting only on change.
///
/// Callers that mutate must hold the store's mutation lock.
pub fn sync_dir(exercise_dir: &Path, now: DateTime<Utc>) -> Result<(FilesData, SyncStats)> {
    let (data, stats) = plan(exercise_dir, now)?;
    if stats.changed() {
        meta::write_record(&exercise_dir.join(FILES_SIDECAR), &data)?;
        debug!(
            dir = %exercise_dir.display(),
            removed = stats.removed,
            added = stats.added,
            "reconciled file metadata"
        );
    }
    Ok((data, stats))
}

/// Compute a reconciliation pass without writing anything.
pub fn plan(exercise_dir: &Path, now: DateTime<Utc>) -> Result<(FilesData, SyncStats)> {
    if !exercise_dir.is_dir() {
        return Err(Error::not_found(exercise_dir.display().to_string()));
    }
    let sidecar = load_sidecar(exercise_dir)?;
    let actual = list_media(exercise_dir)?;
    Ok(reconcile(sidecar, &actual, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, secs).unwrap()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn described(name: &str, description: &str) -> FileMeta {
        let mut meta = FileMeta::new(name, at(0));
        meta.set_description(description, at(1));
        meta
    }

    #[test]
    fn test_reconcile_prunes_and_adds() {
        let sidecar = FilesData {
            files: vec![described("kept.mp4", "front"), described("gone.mp4", "side")],
        };

        let (data, stats) = reconcile(sidecar, &names(&["kept.mp4", "new.png"]), at(10));

        assert_eq!(stats, SyncStats { removed: 1, added: 1 });
        assert_eq!(data.files.len(), 2);
        assert_eq!(data.files[0].file_name, "kept.mp4");
        assert_eq!(data.files[0].description, "front");
        assert_eq!(data.files[1].file_name, "new.png");
        assert_eq!(data.files[1].description, "");
        assert_eq!(data.files[1].created_at, at(10));
    }

    #[test]
    fn test_reconcile_unchanged() {
        let sidecar = FilesData {
            files: vec![described("a.txt", "x")],
        };
        let (data, stats) = reconcile(sidecar.clone(), &names(&["a.txt"]), at(10));
        assert!(!stats.changed());
        assert_eq!(data, sidecar);
    }

    #[test]
    fn test_reconcile_collapses_duplicate_entries() {
        let sidecar = FilesData {
            files: vec![described("a.txt", "first"), described("a.txt", "second")],
        };
        let (data, stats) = reconcile(sidecar, &names(&["a.txt"]), at(10));
        assert!(stats.changed());
        assert_eq!(data.files.len(), 1);
        assert_eq!(data.files[0].description, "first");
    }

    #[test]
    fn test_list_media_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_media(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_list_media_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let media = temp_dir.path().join(MEDIA_DIR);
        fs::create_dir_all(media.join("nested")).unwrap();
        fs::write(media.join("clip.mp4"), b"x").unwrap();

        assert_eq!(list_media(temp_dir.path()).unwrap(), names(&["clip.mp4"]));
    }

    #[test]
    fn test_sync_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let media = dir.join(MEDIA_DIR);
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.txt"), b"a").unwrap();
        fs::write(media.join("b.txt"), b"b").unwrap();

        let (_, first) = sync_dir(dir, at(1)).unwrap();
        assert!(first.changed());
        let after_first = fs::read(dir.join(FILES_SIDECAR)).unwrap();

        let (_, second) = sync_dir(dir, at(2)).unwrap();
        assert!(!second.changed());
        let after_second = fs::read(dir.join(FILES_SIDECAR)).unwrap();

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_sync_dir_without_changes_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (data, stats) = sync_dir(temp_dir.path(), at(1)).unwrap();
        assert!(data.files.is_empty());
        assert!(!stats.changed());
        assert!(!temp_dir.path().join(FILES_SIDECAR).exists());
    }

    #[test]
    fn test_sync_dir_surfaces_corrupt_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(FILES_SIDECAR), "[oops").unwrap();

        let err = sync_dir(temp_dir.path(), at(1)).unwrap_err();
        assert!(matches!(err, Error::CorruptMetadata { .. }));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join(FILES_SIDECAR)).unwrap(),
            "[oops"
        );
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// After reconciliation there is exactly one entry per actual file
        #[test]
        fn prop_one_entry_per_file(
            known in proptest::collection::btree_set("[a-e]{1,2}\\.txt", 0..8),
            actual in proptest::collection::btree_set("[a-e]{1,2}\\.txt", 0..8),
        ) {
            let sidecar = FilesData {
                files: known.iter().map(|n| FileMeta::new(n.clone(), at(0))).collect(),
            };
            let (data, _) = reconcile(sidecar, &actual, at(5));
            let listed: BTreeSet<String> =
                data.files.iter().map(|f| f.file_name.clone()).collect();
            prop_assert_eq!(listed, actual.clone());
            prop_assert_eq!(data.files.len(), actual.len());
        }

        /// A second pass over the same listing changes nothing
        #[test]
        fn prop_reconcile_idempotent(
            known in proptest::collection::btree_set("[a-e]{1,2}\\.txt", 0..8),
            actual in proptest::collection::btree_set("[a-e]{1,2}\\.txt", 0..8),
        ) {
            let sidecar = FilesData {
                files: known.iter().map(|n| FileMeta::new(n.clone(), at(0))).collect(),
            };
            let (once, _) = reconcile(sidecar, &actual, at(5));
            let (twice, stats) = reconcile(once.clone(), &actual, at(9));
            prop_assert!(!stats.changed());
            prop_assert_eq!(once, twice);
        }
    }
}
