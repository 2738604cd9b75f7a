//! # Dojo Core
//!
//! A filesystem-backed store for training content: nested sections holding
//! exercises, each exercise with text, notes and binary attachments.
//!
//! The directory tree is the only source of truth. A directory's role is
//! decided by the sentinel file it holds, and per-attachment descriptions
//! live in a sidecar that is reconciled against the `media/` listing on
//! every read.
//!
//! ## Features
//!
//! - Traversal-proof logical paths rooted at one directory
//! - Atomic JSON sidecars with second-resolution UTC timestamps
//! - Deterministic, case-insensitive tree listing
//! - Serialized mutations with collision-free upload naming
//! - Single-range byte serving for attachments
//!
//! ## Example
//!
//! ```no_run
//! use dojo_core::{ContentStore, StoreOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::init("./dojo-data", StoreOptions::default())?;
//!
//! let section = store.create_section(None, "KungFu")?;
//! let exercise = store.create_exercise(&section, "HorseStance")?;
//! store.update_text(&exercise, "Feet wide, knees out")?;
//!
//! for node in store.build_tree()? {
//!     println!("{} ({})", node.path, node.kind.as_str());
//! }
//!
//! let response = store.serve(&exercise, "clip.mp4", Some("bytes=0-1023"))?;
//! println!("status {}", response.status);
//! # Ok(())
//! # }
//! ```

mod cache;
mod clock;
mod error;
mod media;
mod meta;
mod mutate;
mod path;
mod range;
mod reconcile;
mod seed;
mod store;
mod tree;

#[cfg(test)]
mod testutil;

pub use cache::MetadataCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, ErrorKind, Result};
pub use media::{detect as detect_content_type, OCTET_STREAM};
pub use meta::{
    ExerciseMeta, FileMeta, FilesData, SectionMeta, EXERCISE_SENTINEL, FILES_SIDECAR, NOTES_FILE,
    SECTION_SENTINEL,
};
pub use mutate::{numbered_name, sanitize_upload_name, IncomingFile, PLACEHOLDER_FILE_NAME};
pub use path::{resolve, to_logical, validate_file_name, validate_title, MEDIA_DIR};
pub use range::{
    ByteRange, RangeBody, StreamResponse, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, STATUS_OK, STATUS_PARTIAL_CONTENT, STATUS_RANGE_NOT_SATISFIABLE,
};
pub use reconcile::{reconcile, SyncStats};
pub use store::{ContentStore, ExerciseView, FileInfo, StoreOptions, DEFAULT_CACHE_TTL_SECS};
pub use tree::{build_tree, classify, NodeKind, TreeNode};
