//! Content-type detection for attachments.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fallback for anything unrecognised.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Attachment types checked when the MIME database has no answer.
const KNOWN_MEDIA: &[(&str, &str)] = &[
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("m4v", "video/mp4"),
    ("md", "text/markdown"),
];

/// Bytes needed to recognise every signature below.
const SNIFF_LEN: usize = 16;

/// Look up a content type from the file name alone.
///
/// A generic octet-stream guess counts as no answer.
pub fn from_extension(path: &Path) -> Option<&'static str> {
    let guessed = mime_guess::from_path(path)
        .first_raw()
        .filter(|content_type| *content_type != OCTET_STREAM);
    if guessed.is_some() {
        return guessed;
    }

    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    KNOWN_MEDIA
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, content_type)| *content_type)
}

/// Recognise a content type from leading magic bytes.
pub fn from_signature(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if head.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        Some("image/webp")
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WAVE" {
        Some("audio/wav")
    } else if head.len() >= 8 && &head[4..8] == b"ftyp" {
        if head.len() >= 12 && &head[8..10] == b"qt" {
            Some("video/quicktime")
        } else {
            Some("video/mp4")
        }
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some("video/x-matroska")
    } else if head.starts_with(b"OggS") {
        Some("audio/ogg")
    } else {
        None
    }
}

/// Detect the content type of a file on disk.
///
/// The name wins; the file head is only read when the extension is unknown.
/// Unreadable files fall through to the generic type.
pub fn detect(path: &Path) -> &'static str {
    if let Some(content_type) = from_extension(path) {
        return content_type;
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    if let Ok(file) = File::open(path) {
        let _ = file.take(SNIFF_LEN as u64).read_to_end(&mut head);
    }
    from_signature(&head).unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(from_extension(Path::new("clip.MP4")), Some("video/mp4"));
        assert_eq!(from_extension(Path::new("photo.jpeg")), Some("image/jpeg"));
        assert_eq!(from_extension(Path::new("front.png")), Some("image/png"));
        assert_eq!(from_extension(Path::new("notes.txt")), Some("text/plain"));
        assert_eq!(from_extension(Path::new("match.mkv")), Some("video/x-matroska"));
        assert_eq!(from_extension(Path::new("archive.zzqx")), None);
        assert_eq!(from_extension(Path::new("README")), None);
    }

    #[test]
    fn test_generic_guess_is_not_an_answer() {
        // The MIME database maps .bin to octet-stream, which says nothing
        assert_eq!(from_extension(Path::new("upload.bin")), None);
    }

    #[test]
    fn test_signatures() {
        assert_eq!(from_signature(b"\x89PNG\r\n\x1a\n...."), Some("image/png"));
        assert_eq!(from_signature(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(
            from_signature(b"\x00\x00\x00\x18ftypmp42"),
            Some("video/mp4")
        );
        assert_eq!(from_signature(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(from_signature(b"hello"), None);
        assert_eq!(from_signature(b""), None);
    }

    #[test]
    fn test_detect_sniffs_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("upload.bin");
        std::fs::write(&path, b"GIF89a\x01\x00").unwrap();
        assert_eq!(detect(&path), "image/gif");
    }

    #[test]
    fn test_detect_defaults_to_octet_stream() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");
        std::fs::write(&path, b"plain bytes").unwrap();
        assert_eq!(detect(&path), OCTET_STREAM);
    }
}
