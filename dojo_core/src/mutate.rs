//! Creation, rename and deletion of sections, exercises and attachments.
//!
//! Every operation here runs under the store-wide mutation lock and
//! validates its inputs before touching the filesystem.

use crate::error::{Error, Result};
use crate::meta::{self, ExerciseMeta, SectionMeta, FILES_SIDECAR, NOTES_FILE};
use crate::path::{self, MEDIA_DIR};
use crate::reconcile;
use crate::store::ContentStore;
use crate::tree::{self, NodeKind};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name used when an upload arrives without a usable one.
pub const PLACEHOLDER_FILE_NAME: &str = "file";

/// A file offered for upload.
#[derive(Debug)]
pub struct IncomingFile<R> {
    /// Name suggested by the client; may carry directory components.
    pub name: String,
    /// Source of the file's bytes.
    pub content: R,
}

impl<R: Read> IncomingFile<R> {
    pub fn new(name: impl Into<String>, content: R) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

impl ContentStore {
    /// Create a section under `parent` (the root when `None` or blank).
    ///
    /// Returns the new section's logical path.
    pub fn create_section(&self, parent: Option<&str>, title: &str) -> Result<String> {
        let title = path::validate_title(title)?;
        let parent = parent.map(str::trim).filter(|p| !p.is_empty());
        let parent_dir = match parent {
            Some(parent) => self.resolve(parent)?,
            None => self.root().to_path_buf(),
        };

        let _guard = self.lock();
        match parent {
            Some(parent) if parent_dir != self.root() => {
                self.expect_kind(&parent_dir, parent, NodeKind::Section)?
            }
            _ => fs::create_dir_all(&parent_dir)?,
        }

        let dir = self.claim_dir(&parent_dir, title)?;
        let record = SectionMeta::new(title, self.clock().timestamp());
        undo_on_err(&dir, meta::write_record(&dir.join(NodeKind::Section.sentinel()), &record))?;

        let logical = path::to_logical(self.root(), &dir)?;
        info!(path = %logical, "created section");
        Ok(logical)
    }

    /// Create an exercise inside an existing section.
    ///
    /// Returns the new exercise's logical path.
    pub fn create_exercise(&self, section: &str, title: &str) -> Result<String> {
        let title = path::validate_title(title)?;
        let section_dir = self.resolve(section)?;

        let _guard = self.lock();
        self.expect_kind(&section_dir, section, NodeKind::Section)?;

        let dir = self.claim_dir(&section_dir, title)?;
        let record = ExerciseMeta::new(title, "", self.clock().timestamp());
        undo_on_err(&dir, populate_exercise(&dir, &record))?;

        let logical = path::to_logical(self.root(), &dir)?;
        info!(path = %logical, "created exercise");
        Ok(logical)
    }

    /// Rename a section or exercise; returns the new logical path.
    pub fn rename(&self, logical: &str, new_title: &str) -> Result<String> {
        self.rename_node(logical, new_title, None)
    }

    /// Rename a section; fails `NotFound` if the path is not a section.
    pub fn rename_section(&self, logical: &str, new_title: &str) -> Result<String> {
        self.rename_node(logical, new_title, Some(NodeKind::Section))
    }

    /// Rename an exercise; fails `NotFound` if the path is not an exercise.
    pub fn rename_exercise(&self, logical: &str, new_title: &str) -> Result<String> {
        self.rename_node(logical, new_title, Some(NodeKind::Exercise))
    }

    /// Recursively delete a section or exercise.
    pub fn delete(&self, logical: &str) -> Result<()> {
        self.delete_node(logical, None)
    }

    /// Recursively delete a section and everything below it.
    pub fn delete_section(&self, logical: &str) -> Result<()> {
        self.delete_node(logical, Some(NodeKind::Section))
    }

    /// Delete an exercise with its notes and attachments.
    pub fn delete_exercise(&self, logical: &str) -> Result<()> {
        self.delete_node(logical, Some(NodeKind::Exercise))
    }

    /// Replace an exercise's text.
    pub fn update_text(&self, logical: &str, text: &str) -> Result<()> {
        let dir = self.resolve(logical)?;

        let _guard = self.lock();
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        let sentinel = dir.join(NodeKind::Exercise.sentinel());
        let mut record: ExerciseMeta = meta::read_record(&sentinel)?;
        record.set_text(text, self.clock().timestamp());
        meta::write_record(&sentinel, &record)?;
        self.exercise_cache().invalidate(&sentinel);

        info!(path = %logical, "updated exercise text");
        Ok(())
    }

    /// Replace an exercise's notes.
    pub fn update_notes(&self, logical: &str, notes: &str) -> Result<()> {
        let dir = self.resolve(logical)?;

        let _guard = self.lock();
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        meta::write_text(&dir.join(NOTES_FILE), notes)?;

        let sentinel = dir.join(NodeKind::Exercise.sentinel());
        let mut record: ExerciseMeta = meta::read_record(&sentinel)?;
        record.touch(self.clock().timestamp());
        meta::write_record(&sentinel, &record)?;
        self.exercise_cache().invalidate(&sentinel);

        info!(path = %logical, "updated exercise notes");
        Ok(())
    }

    /// Set the description of one attachment.
    ///
    /// The file must be present after reconciliation.
    pub fn update_file_description(
        &self,
        logical: &str,
        file_name: &str,
        description: &str,
    ) -> Result<()> {
        path::validate_file_name(file_name)?;
        let dir = self.resolve(logical)?;

        let _guard = self.lock();
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;

        let now = self.clock().timestamp();
        let (mut data, _) = reconcile::sync_dir(&dir, now)?;
        let entry = data
            .get_mut(file_name)
            .ok_or_else(|| Error::not_found(format!("file {} in {}", file_name, logical)))?;
        entry.set_description(description, now);
        meta::write_record(&dir.join(FILES_SIDECAR), &data)?;

        info!(path = %logical, file = %file_name, "updated file description");
        Ok(())
    }

    /// Store uploaded files in an exercise's media directory.
    ///
    /// Names are reduced to their last path component and made unique by
    /// appending `(n)` before the extension. Returns the stored names in
    /// input order.
    pub fn upload_files<R: Read>(
        &self,
        logical: &str,
        files: Vec<IncomingFile<R>>,
    ) -> Result<Vec<String>> {
        let names = files
            .iter()
            .map(|f| {
                let name = sanitize_upload_name(&f.name);
                path::validate_file_name(&name).map(|_| name)
            })
            .collect::<Result<Vec<_>>>()?;
        let dir = self.resolve(logical)?;

        let _guard = self.lock();
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        let media_dir = dir.join(MEDIA_DIR);
        fs::create_dir_all(&media_dir)?;
        // Prune entries for removed files so a reused name starts fresh
        reconcile::sync_dir(&dir, self.clock().timestamp())?;

        let mut stored = Vec::with_capacity(files.len());
        for (file, name) in files.into_iter().zip(names) {
            let stored_name = store_upload(&dir, &media_dir, &name, file.content)?;
            info!(path = %logical, file = %stored_name, "stored upload");
            stored.push(stored_name);
        }

        Ok(stored)
    }

    /// Remove one attachment.
    ///
    /// The sidecar entry is left for the next reconciliation pass to prune.
    pub fn delete_file(&self, logical: &str, file_name: &str) -> Result<()> {
        path::validate_file_name(file_name)?;
        let dir = self.resolve(logical)?;

        let _guard = self.lock();
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        let file_path = dir.join(MEDIA_DIR).join(file_name);
        if !file_path.is_file() {
            return Err(Error::not_found(format!("file {} in {}", file_name, logical)));
        }
        fs::remove_file(&file_path).map_err(|e| Error::from_read(&file_path, e))?;

        info!(path = %logical, file = %file_name, "deleted file");
        Ok(())
    }

    /// Absolute path of an existing attachment.
    pub fn media_path(&self, logical: &str, file_name: &str) -> Result<PathBuf> {
        path::validate_file_name(file_name)?;
        let dir = self.resolve(logical)?;
        self.expect_kind(&dir, logical, NodeKind::Exercise)?;
        let file_path = dir.join(MEDIA_DIR).join(file_name);
        if !file_path.is_file() {
            return Err(Error::not_found(format!("file {} in {}", file_name, logical)));
        }
        Ok(file_path)
    }

    /// Metadata first, then the directory move.
    ///
    /// A crash between the two steps leaves the old directory with its new
    /// title, never a moved directory with a stale one.
    fn rename_node(&self, logical: &str, new_title: &str, want: Option<NodeKind>) -> Result<String> {
        let title = path::validate_title(new_title)?;
        let dir = self.resolve(logical)?;
        if dir == self.root() {
            return Err(Error::invalid_path("The store root cannot be renamed"));
        }

        let _guard = self.lock();
        let kind = self.existing_kind(&dir, logical, want)?;
        let parent = dir
            .parent()
            .ok_or_else(|| Error::invalid_path(format!("{} has no parent", logical)))?;
        let target = parent.join(title);
        let moving = target != dir;

        // Checked before the sentinel write so a conflict leaves nothing behind
        if moving && fs::symlink_metadata(&target).is_ok() {
            return Err(Error::conflict(path::to_logical(self.root(), &target)?));
        }

        let sentinel = dir.join(kind.sentinel());
        let previous = fs::read(&sentinel).map_err(|e| Error::from_read(&sentinel, e))?;
        let now = self.clock().timestamp();
        match kind {
            NodeKind::Section => {
                let mut record: SectionMeta = meta::read_record(&sentinel)?;
                record.retitle(title, now);
                meta::write_record(&sentinel, &record)?;
            }
            NodeKind::Exercise => {
                let mut record: ExerciseMeta = meta::read_record(&sentinel)?;
                record.retitle(title, now);
                meta::write_record(&sentinel, &record)?;
            }
        }
        self.exercise_cache().invalidate_under(&dir);

        if moving {
            move_or_restore(&dir, &target, &sentinel, &previous)?;
        }

        let new_logical = path::to_logical(self.root(), &target)?;
        info!(from = %logical, to = %new_logical, kind = kind.as_str(), "renamed");
        Ok(new_logical)
    }

    fn delete_node(&self, logical: &str, want: Option<NodeKind>) -> Result<()> {
        let dir = self.resolve(logical)?;
        if dir == self.root() {
            return Err(Error::invalid_path("The store root cannot be deleted"));
        }

        let _guard = self.lock();
        let kind = self.existing_kind(&dir, logical, want)?;
        fs::remove_dir_all(&dir).map_err(|e| Error::from_read(&dir, e))?;
        self.exercise_cache().invalidate_under(&dir);

        info!(path = %logical, kind = kind.as_str(), "deleted");
        Ok(())
    }

    /// Classify a directory, requiring a sentinel (of `want`, if given).
    fn existing_kind(&self, dir: &Path, logical: &str, want: Option<NodeKind>) -> Result<NodeKind> {
        match (tree::classify(dir)?, want) {
            (Some(found), Some(want)) if found != want => {
                Err(Error::not_found(format!("{} {}", want.as_str(), logical)))
            }
            (Some(found), _) => Ok(found),
            (None, Some(want)) => Err(Error::not_found(format!("{} {}", want.as_str(), logical))),
            (None, None) => Err(Error::not_found(logical)),
        }
    }

    /// Create `parent/name`, failing `Conflict` if anything is already there.
    fn claim_dir(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        let dir = parent.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::conflict(path::to_logical(self.root(), &dir)?))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn populate_exercise(dir: &Path, record: &ExerciseMeta) -> Result<()> {
    fs::create_dir(dir.join(MEDIA_DIR))?;
    meta::write_record(&dir.join(NodeKind::Exercise.sentinel()), record)?;
    meta::write_text(&dir.join(NOTES_FILE), "")
}

/// Move `dir` to `target`, writing `previous` back to `sentinel` on failure.
fn move_or_restore(dir: &Path, target: &Path, sentinel: &Path, previous: &[u8]) -> Result<()> {
    if let Err(err) = fs::rename(dir, target) {
        meta::write_atomic(sentinel, previous)?;
        return Err(err.into());
    }
    Ok(())
}

/// Remove a freshly claimed directory if populating it failed.
fn undo_on_err<T>(dir: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        debug!(dir = %dir.display(), "rolling back partially created directory");
        let _ = fs::remove_dir_all(dir);
    }
    result
}

/// Reduce a client-supplied name to a bare file name.
pub fn sanitize_upload_name(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        PLACEHOLDER_FILE_NAME.to_string()
    } else {
        base.to_string()
    }
}

/// The `n`th alternative for a taken name: `clip.mp4` becomes `clip(n).mp4`.
pub fn numbered_name(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{}({})", name, n),
    }
}

/// Write `content` into `media_dir` under the first free variant of `name`.
///
/// Bytes are staged in the exercise directory and moved into place with a
/// no-clobber persist, so an existing file is never overwritten.
fn store_upload<R: Read>(
    exercise_dir: &Path,
    media_dir: &Path,
    name: &str,
    mut content: R,
) -> Result<String> {
    let mut temp_file = tempfile::NamedTempFile::new_in(exercise_dir)?;
    io::copy(&mut content, &mut temp_file)?;
    temp_file.flush()?;

    let mut candidate = name.to_string();
    let mut counter = 1;
    loop {
        let target = media_dir.join(&candidate);
        if target.exists() {
            candidate = numbered_name(name, counter);
            counter += 1;
            continue;
        }
        match temp_file.persist_noclobber(&target) {
            Ok(_) => return Ok(candidate),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                // Lost a race with a writer outside the store
                temp_file = err.file;
                candidate = numbered_name(name, counter);
                counter += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
