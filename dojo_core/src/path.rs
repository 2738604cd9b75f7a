//! Logical path validation and resolution.
//!
//! A logical path is a root-relative, `/`-separated identifier such as
//! `KungFu/Basics/HorseStance`. Nothing in this module touches the
//! filesystem: every check is textual or lexical.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Name of the directory holding an exercise's attachments.
pub const MEDIA_DIR: &str = "media";

/// Entries whose name starts with this marker are invisible to the store.
pub const RESERVED_PREFIX: char = '.';

/// Resolve a logical path against the store root.
///
/// Fails with `InvalidPath` if the path is blank, contains `..`, is
/// absolute, or does not normalize to the root or one of its descendants.
pub fn resolve(root: &Path, logical: &str) -> Result<PathBuf> {
    if logical.trim().is_empty() {
        return Err(Error::invalid_path("Path must not be empty"));
    }
    if logical.contains("..") {
        return Err(Error::invalid_path(format!(
            "Path traversal is not allowed: {}",
            logical
        )));
    }
    if logical.contains('\0') {
        return Err(Error::invalid_path("Path cannot contain null bytes"));
    }

    let relative = Path::new(logical);
    if relative.is_absolute() || relative.has_root() {
        return Err(Error::invalid_path(format!(
            "Absolute paths are not allowed: {}",
            logical
        )));
    }

    let resolved = normalize(&root.join(relative));
    if !resolved.starts_with(root) {
        return Err(Error::invalid_path(format!(
            "Path escapes the store root: {}",
            logical
        )));
    }

    Ok(resolved)
}

/// Validate a single file name supplied by a caller.
///
/// Rejects blank names, names containing `..`, and names containing a
/// path separator.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_path("File name must not be empty"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_path(format!("Invalid file name: {}", name)));
    }
    if name.contains('\0') {
        return Err(Error::invalid_path("File name cannot contain null bytes"));
    }
    Ok(())
}

/// Validate a section or exercise title, which doubles as its directory name.
///
/// Returns the trimmed title. Names the tree scan would hide (the reserved
/// prefix and the media directory) are rejected.
pub fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    validate_file_name(title)?;

    if title.starts_with(RESERVED_PREFIX) {
        return Err(Error::invalid_path(format!(
            "Title cannot start with '{}': {}",
            RESERVED_PREFIX, title
        )));
    }
    if title == MEDIA_DIR {
        return Err(Error::invalid_path(format!(
            "Title '{}' is reserved",
            MEDIA_DIR
        )));
    }

    Ok(title)
}

/// Convert an absolute path inside the root back into its logical form.
pub fn to_logical(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::invalid_path(format!("{} is outside the store root", path.display()))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(name) = component {
            let name = name.to_str().ok_or_else(|| {
                Error::invalid_path(format!("Non UTF-8 path: {}", path.display()))
            })?;
            parts.push(name);
        }
    }

    Ok(parts.join("/"))
}

/// Lexically normalize a path, dropping `.` and folding `..`.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn root() -> PathBuf {
        PathBuf::from("/srv/dojo")
    }

    #[test]
    fn test_resolve_nested() {
        let resolved = resolve(&root(), "KungFu/Basics").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/dojo/KungFu/Basics"));
    }

    #[test]
    fn test_resolve_drops_current_dir_segments() {
        let resolved = resolve(&root(), "./KungFu/./Basics/").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/dojo/KungFu/Basics"));
    }

    #[test]
    fn test_resolve_rejects_blank() {
        assert_eq!(resolve(&root(), "").unwrap_err().kind(), ErrorKind::InvalidPath);
        assert_eq!(
            resolve(&root(), "   ").unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        for path in ["..", "../etc/passwd", "KungFu/../../x", "a/..", "a..b"] {
            assert_eq!(
                resolve(&root(), path).unwrap_err().kind(),
                ErrorKind::InvalidPath,
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_absolute() {
        assert_eq!(
            resolve(&root(), "/etc/passwd").unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("clip.mp4").is_ok());
        assert!(validate_file_name("a(1).txt").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name(" ").is_err());
        assert!(validate_file_name("../../etc/passwd").is_err());
        assert!(validate_file_name("a/b").is_err());
        assert!(validate_file_name("a\\b").is_err());
    }

    #[test]
    fn test_validate_title_reserved_names() {
        assert_eq!(validate_title("  Horse Stance ").unwrap(), "Horse Stance");
        assert!(validate_title(".hidden").is_err());
        assert!(validate_title("media").is_err());
        assert!(validate_title("Basics/Kicks").is_err());
    }

    #[test]
    fn test_to_logical() {
        let logical = to_logical(&root(), Path::new("/srv/dojo/KungFu/Basics")).unwrap();
        assert_eq!(logical, "KungFu/Basics");
        assert!(to_logical(&root(), Path::new("/etc")).is_err());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any path containing `..` is rejected
        #[test]
        fn prop_traversal_always_rejected(
            prefix in "[a-zA-Z0-9_/ -]{0,20}",
            suffix in "[a-zA-Z0-9_/ -]{0,20}",
        ) {
            let logical = format!("{}..{}", prefix, suffix);
            let result = resolve(&root(), &logical);
            prop_assert!(result.is_err(), "accepted {:?}", logical);
            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidPath);
        }

        /// Any absolute path is rejected
        #[test]
        fn prop_absolute_always_rejected(rest in "[a-zA-Z0-9_/ -]{0,30}") {
            let logical = format!("/{}", rest);
            let result = resolve(&root(), &logical);
            prop_assert!(result.is_err(), "accepted {:?}", logical);
            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidPath);
        }

        /// Accepted paths always stay under the root
        #[test]
        fn prop_resolved_stays_under_root(logical in "[a-zA-Z0-9_. /-]{1,40}") {
            if let Ok(resolved) = resolve(&root(), &logical) {
                prop_assert!(resolved.starts_with(root()));
            }
        }
    }
}
