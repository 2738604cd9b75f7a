//! Store handle and read operations.

use crate::cache::MetadataCache;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::media;
use crate::meta::{self, ExerciseMeta, FilesData, SectionMeta, NOTES_FILE};
use crate::path::{self, MEDIA_DIR};
use crate::reconcile;
use crate::tree::{self, NodeKind, TreeNode};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Default staleness window for cached exercise metadata, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 5;

/// Tunables for a [`ContentStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a parsed exercise sentinel may be served from memory.
    pub cache_ttl: TimeDelta,
    /// Time source for timestamps and cache expiry.
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::seconds(DEFAULT_CACHE_TTL_SECS),
            clock: Arc::new(SystemClock),
        }
    }
}

impl StoreOptions {
    pub fn with_cache_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// An exercise as presented to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseView {
    pub path: String,
    pub title: String,
    pub text: String,
    pub notes: String,
    #[serde(with = "crate::meta::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::meta::timestamp")]
    pub updated_at: DateTime<Utc>,
    pub files: Vec<FileInfo>,
}

/// One attachment of an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
    pub description: String,
}

/// A hierarchical content store rooted at one directory.
///
/// Mutations serialize on a single store-wide lock. Reads take no lock and
/// tolerate concurrent mutation.
#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    exercises: MetadataCache<ExerciseMeta>,
    write_lock: Mutex<()>,
}

impl ContentStore {
    /// Open a store at `root` without touching the filesystem.
    ///
    /// The root does not have to exist yet; an absent root reads as empty.
    pub fn open<P: AsRef<Path>>(root: P, options: StoreOptions) -> Result<Self> {
        // Lexical cleanup so prefix checks compare like with like
        let root = path::normalize(&std::path::absolute(root.as_ref())?);

        Ok(Self {
            root,
            exercises: MetadataCache::new(options.cache_ttl, options.clock.clone()),
            clock: options.clock,
            write_lock: Mutex::new(()),
        })
    }

    /// Open a store, creating the root directory if needed.
    pub fn init<P: AsRef<Path>>(root: P, options: StoreOptions) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let store = Self::open(root, options)?;
        debug!(root = %store.root.display(), "store initialized");
        Ok(store)
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path to an absolute location inside the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf> {
        path::resolve(&self.root, logical)
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn exercise_cache(&self) -> &MetadataCache<ExerciseMeta> {
        &self.exercises
    }

    /// Take the store-wide mutation lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Build the ordered section/exercise forest.
    pub fn build_tree(&self) -> Result<Vec<TreeNode>> {
        tree::build_tree(&self.root)
    }

    /// Classify the directory at a logical path.
    pub fn classify(&self, logical: &str) -> Result<NodeKind> {
        let dir = self.resolve(logical)?;
        tree::classify(&dir)?.ok_or_else(|| Error::not_found(logical))
    }

    /// Read a section's metadata.
    pub fn get_section(&self, logical: &str) -> Result<SectionMeta> {
        let dir = self.resolve(logical)?;
        self.expect_kind(&dir, logical, NodeKind::Section)?;
        meta::read_record(&dir.join(NodeKind::Section.sentinel()))
    }

    /// Read an exercise together with its notes and reconciled file list.
    pub fn get_exercise(&self, logical: &str) -> Result<ExerciseView> {
        let dir = self.resolve(logical)?;
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;

        let meta = self.load_exercise_cached(&dir)?;
        let notes = meta::read_text_or_empty(&dir.join(NOTES_FILE))?;
        let files = self.file_infos(&dir, self.sync_dir(&dir)?);

        Ok(ExerciseView {
            path: path::to_logical(&self.root, &dir)?,
            title: meta.title,
            text: meta.text,
            notes,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            files,
        })
    }

    /// Reconcile an exercise's file metadata and return it.
    pub fn sync_files(&self, logical: &str) -> Result<FilesData> {
        let dir = self.resolve(logical)?;
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        self.sync_dir(&dir)
    }

    /// Reconcile without the lock when nothing changed, under it otherwise.
    pub(crate) fn sync_dir(&self, dir: &Path) -> Result<FilesData> {
        let (data, stats) = reconcile::plan(dir, self.clock.timestamp())?;
        if !stats.changed() {
            return Ok(data);
        }

        let _guard = self.lock();
        let (data, _) = reconcile::sync_dir(dir, self.clock.timestamp())?;
        Ok(data)
    }

    /// Require the directory to carry exactly the sentinel of `kind`.
    pub(crate) fn expect_kind(&self, dir: &Path, logical: &str, kind: NodeKind) -> Result<()> {
        match tree::classify(dir)? {
            Some(found) if found == kind => Ok(()),
            _ => Err(Error::not_found(format!("{} {}", kind.as_str(), logical))),
        }
    }

    fn load_exercise_cached(&self, dir: &Path) -> Result<ExerciseMeta> {
        let sentinel = dir.join(NodeKind::Exercise.sentinel());
        if let Some(meta) = self.exercises.get(&sentinel) {
            return Ok(meta);
        }
        let meta: ExerciseMeta = meta::read_record(&sentinel)?;
        self.exercises.insert(sentinel, meta.clone());
        Ok(meta)
    }

    fn file_infos(&self, dir: &Path, data: FilesData) -> Vec<FileInfo> {
        let media_dir = dir.join(MEDIA_DIR);
        let mut infos: Vec<FileInfo> = data
            .files
            .into_iter()
            .filter_map(|entry| {
                let file_path = media_dir.join(&entry.file_name);
                // Deleted since reconciliation: leave it out
                let size = fs::metadata(&file_path).ok()?.len();
                Some(FileInfo {
                    content_type: media::detect(&file_path).to_string(),
                    file_name: entry.file_name,
                    size,
                    description: entry.description,
                })
            })
            .collect();
        infos.sort_by(|a, b| tree::compare_names(&a.file_name, &b.file_name));
        infos
    }
}
