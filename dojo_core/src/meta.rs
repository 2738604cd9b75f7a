//! Sidecar metadata records and their JSON encoding.
//!
//! Three record shapes live next to the content they describe:
//!
//! - `_section.json` marks a section directory
//! - `exercise.json` marks an exercise directory
//! - `files.json` carries per-attachment descriptions for an exercise
//!
//! Writes replace the whole file atomically (temp file + rename in the same
//! directory). `createdAt` is fixed at construction; every mutator refreshes
//! `updatedAt`.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Sentinel file marking a section.
pub const SECTION_SENTINEL: &str = "_section.json";

/// Sentinel file marking an exercise.
pub const EXERCISE_SENTINEL: &str = "exercise.json";

/// Per-exercise file metadata sidecar.
pub const FILES_SIDECAR: &str = "files.json";

/// Free-text notes stored beside an exercise sentinel.
pub const NOTES_FILE: &str = "notes.md";

/// Metadata recorded in a section sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMeta {
    pub title: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl SectionMeta {
    /// Create a fresh section record.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Change the title.
    pub fn retitle(&mut self, title: impl Into<String>, now: DateTime<Utc>) {
        self.title = title.into();
        self.updated_at = now;
    }
}

/// Metadata recorded in an exercise sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseMeta {
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ExerciseMeta {
    /// Create a fresh exercise record.
    pub fn new(title: impl Into<String>, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Change the title.
    pub fn retitle(&mut self, title: impl Into<String>, now: DateTime<Utc>) {
        self.title = title.into();
        self.updated_at = now;
    }

    /// Replace the exercise text.
    pub fn set_text(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.text = text.into();
        self.updated_at = now;
    }

    /// Record a change to content stored beside the sentinel.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// One attachment's entry in `files.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl FileMeta {
    /// Create an entry with an empty description.
    pub fn new(file_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.into(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the description.
    pub fn set_description(&mut self, description: impl Into<String>, now: DateTime<Utc>) {
        self.description = description.into();
        self.updated_at = now;
    }
}

/// The contents of `files.json`: entries in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesData {
    #[serde(default)]
    pub files: Vec<FileMeta>,
}

impl FilesData {
    /// Look up an entry by file name for mutation.
    pub fn get_mut(&mut self, file_name: &str) -> Option<&mut FileMeta> {
        self.files.iter_mut().find(|f| f.file_name == file_name)
    }
}

/// Read a record that must exist.
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| Error::from_read(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::corrupt_metadata(path, e.to_string()))
}

/// Read a record, returning `None` if the file does not exist.
///
/// A file that exists but does not parse is still an error; it is never
/// treated as absent.
pub fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_record(path) {
        Ok(record) => Ok(Some(record)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write a record, replacing any previous content.
pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(record).map_err(|e| {
        Error::Io {
            source: std::io::Error::other(e),
        }
    })?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Read a text blob, treating a missing file as empty.
pub fn read_text_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write a text blob, replacing any previous content.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, text.as_bytes())
}

/// Write bytes through a temp file in the target's directory, then rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::invalid_path(format!("{} has no parent", path.display())))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.persist(path)?;

    Ok(())
}

/// Serde adapter for `YYYY-MM-DDTHH:MM:SSZ` timestamps.
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
