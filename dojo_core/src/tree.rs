//! Classification and enumeration of the section/exercise hierarchy.
//!
//! A directory's role is decided by which sentinel file it holds. The scan
//! determines the kind once and carries it as [`NodeKind`]; nothing
//! downstream re-inspects sentinels.

use crate::error::{Error, Result};
use crate::meta::{EXERCISE_SENTINEL, SECTION_SENTINEL};
use crate::path::{self, MEDIA_DIR};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Role of a content directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Section,
    Exercise,
}

impl NodeKind {
    /// Sentinel file name for this kind.
    pub fn sentinel(self) -> &'static str {
        match self {
            NodeKind::Section => SECTION_SENTINEL,
            NodeKind::Exercise => EXERCISE_SENTINEL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Section => "section",
            NodeKind::Exercise => "exercise",
        }
    }
}

/// A node in the content forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Directory name.
    pub name: String,
    /// Logical path from the store root.
    pub path: String,
    #[serde(rename = "nodeType")]
    pub kind: NodeKind,
    /// Present for sections only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Decide what a directory is from its sentinels.
///
/// Returns `None` for a plain directory and `CorruptMetadata` when both
/// sentinels are present.
pub fn classify(dir: &Path) -> Result<Option<NodeKind>> {
    let is_exercise = dir.join(EXERCISE_SENTINEL).is_file();
    let is_section = dir.join(SECTION_SENTINEL).is_file();

    match (is_section, is_exercise) {
        (true, true) => Err(Error::corrupt_metadata(
            dir,
            format!(
                "both {} and {} are present",
                SECTION_SENTINEL, EXERCISE_SENTINEL
            ),
        )),
        (true, false) => Ok(Some(NodeKind::Section)),
        (false, true) => Ok(Some(NodeKind::Exercise)),
        (false, false) => Ok(None),
    }
}

/// Build the ordered forest below `root`.
///
/// A missing root yields an empty forest.
pub fn build_tree(root: &Path) -> Result<Vec<TreeNode>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    build_children(root, root)
}

fn build_children(root: &Path, dir: &Path) -> Result<Vec<TreeNode>> {
    let mut nodes = Vec::new();

    for (name, entry_path) in list_subdirs(dir)? {
        let Some(kind) = classify(&entry_path)? else {
            debug!(dir = %entry_path.display(), "ignoring directory without sentinel");
            continue;
        };

        let logical = path::to_logical(root, &entry_path)?;
        let children = match kind {
            NodeKind::Exercise => None,
            NodeKind::Section => Some(build_children(root, &entry_path)?),
        };

        nodes.push(TreeNode {
            name,
            path: logical,
            kind,
            children,
        });
    }

    Ok(nodes)
}

/// Immediate visible sub-directories of `dir`, ordered by name.
///
/// Dot-prefixed entries are dropped by the walker's hidden filter; the
/// media directory is dropped by name. Symlinks are never followed.
fn list_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let walker = ignore::WalkBuilder::new(dir)
        .max_depth(Some(1))
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .build();

    let mut subdirs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_vanished(&err) => {
                // Raced a delete; what is gone is simply not listed
                debug!(dir = %dir.display(), "directory vanished during scan");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "skipping non UTF-8 directory name");
            continue;
        };
        if name == MEDIA_DIR {
            continue;
        }

        subdirs.push((name.to_string(), entry.path().to_path_buf()));
    }

    subdirs.sort_by(|a, b| compare_names(&a.0, &b.0));
    Ok(subdirs)
}

/// Case-insensitive ordinal order, ties broken by exact bytes.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn is_vanished(err: &ignore::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}
