//! Single-range byte serving for exercise attachments.
//!
//! Only the simple `bytes=<start>-[<end>]` form is understood. Anything else
//! in a `Range` header is treated as if no range had been requested.

use crate::error::{Error, Result};
use crate::media;
use crate::store::ContentStore;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL_CONTENT: u16 = 206;
pub const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_RANGE: &str = "Content-Range";
pub const ACCEPT_RANGES: &str = "Accept-Ranges";

/// A requested byte window; `end` is inclusive and open when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` header value.
    ///
    /// Returns `None` for anything other than a well-formed first range.
    pub fn parse(header: &str) -> Option<Self> {
        let ranges = header.trim().strip_prefix("bytes=")?;
        let first = ranges.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;

        let start = start.trim();
        if start.is_empty() {
            // Suffix ranges are not supported
            return None;
        }
        let start: u64 = start.parse().ok()?;

        let end = match end.trim() {
            "" => None,
            end => Some(end.parse::<u64>().ok()?),
        };
        if end.is_some_and(|end| end < start) {
            return None;
        }

        Some(Self { start, end })
    }
}

/// Status, headers and body for one streaming request.
#[derive(Debug)]
pub struct StreamResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    /// Absent for 416.
    pub body: Option<RangeBody>,
}

impl StreamResponse {
    /// Look up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A file handle limited to the served window.
///
/// Dropping it closes the file.
#[derive(Debug)]
pub struct RangeBody {
    inner: io::Take<File>,
}

impl RangeBody {
    fn new(mut file: File, start: u64, len: u64) -> io::Result<Self> {
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }
        Ok(Self {
            inner: file.take(len),
        })
    }

    /// Bytes still to be read.
    pub fn remaining(&self) -> u64 {
        self.inner.limit()
    }
}

impl Read for RangeBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl ContentStore {
    /// Serve an attachment, honoring an optional `Range` header.
    ///
    /// Takes no lock; a file deleted mid-request surfaces as `NotFound`.
    pub fn serve(
        &self,
        exercise: &str,
        file_name: &str,
        range: Option<&str>,
    ) -> Result<StreamResponse> {
        let path = self.media_path(exercise, file_name)?;
        let file = File::open(&path).map_err(|e| Error::from_read(&path, e))?;
        let length = file.metadata().map_err(|e| Error::from_read(&path, e))?.len();

        let mut headers = vec![
            (CONTENT_TYPE, media::detect(&path).to_string()),
            (ACCEPT_RANGES, "bytes".to_string()),
        ];

        let Some(range) = range.and_then(ByteRange::parse) else {
            headers.push((CONTENT_LENGTH, length.to_string()));
            return Ok(StreamResponse {
                status: STATUS_OK,
                headers,
                body: Some(RangeBody::new(file, 0, length)?),
            });
        };

        if range.start >= length {
            debug!(file = %path.display(), start = range.start, length, "range not satisfiable");
            headers.push((CONTENT_RANGE, format!("bytes */{}", length)));
            return Ok(StreamResponse {
                status: STATUS_RANGE_NOT_SATISFIABLE,
                headers,
                body: None,
            });
        }

        let end = range.end.map_or(length - 1, |end| end.min(length - 1));
        let window = end - range.start + 1;
        headers.push((
            CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, end, length),
        ));
        headers.push((CONTENT_LENGTH, window.to_string()));

        Ok(StreamResponse {
            status: STATUS_PARTIAL_CONTENT,
            headers,
            body: Some(RangeBody::new(file, range.start, window)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::path::MEDIA_DIR;
    use crate::testutil::test_store;
    use std::fs;
    use tempfile::TempDir;

    const EXERCISE: &str = "KungFu/Basics/HorseStance";
    const FIVE_MIB: usize = 5 * 1024 * 1024;

    fn store_with_file(temp_dir: &TempDir, name: &str, bytes: &[u8]) -> ContentStore {
        let (_clock, store) = test_store(temp_dir);
        store.seed_demo().unwrap();
        let media = store.resolve(EXERCISE).unwrap().join(MEDIA_DIR);
        fs::write(media.join(name), bytes).unwrap();
        store
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn read_body(response: StreamResponse) -> Vec<u8> {
        let mut out = Vec::new();
        response.body.unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            ByteRange::parse("bytes=0-1023"),
            Some(ByteRange { start: 0, end: Some(1023) })
        );
        assert_eq!(
            ByteRange::parse("bytes=500-"),
            Some(ByteRange { start: 500, end: None })
        );
        assert_eq!(
            ByteRange::parse(" bytes= 10 - 20 , 30-40"),
            Some(ByteRange { start: 10, end: Some(20) })
        );
    }

    #[test]
    fn test_parse_range_malformed() {
        for header in ["", "bytes=", "bytes=-500", "bytes=a-b", "items=0-1", "bytes=20-10", "bytes=5"] {
            assert_eq!(ByteRange::parse(header), None, "{header:?}");
        }
    }

    #[test]
    fn test_full_file_without_range() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "clip.mp4", b"0123456789");

        let response = store.serve(EXERCISE, "clip.mp4", None).unwrap();
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.header(CONTENT_LENGTH), Some("10"));
        assert_eq!(response.header(CONTENT_TYPE), Some("video/mp4"));
        assert_eq!(response.header(ACCEPT_RANGES), Some("bytes"));
        assert!(response.header(CONTENT_RANGE).is_none());
        assert_eq!(read_body(response), b"0123456789");
    }

    #[test]
    fn test_first_kibibyte_of_large_file() {
        let temp_dir = TempDir::new().unwrap();
        let bytes = patterned(FIVE_MIB);
        let store = store_with_file(&temp_dir, "big.bin", &bytes);

        let response = store
            .serve(EXERCISE, "big.bin", Some("bytes=0-1023"))
            .unwrap();
        assert_eq!(response.status, STATUS_PARTIAL_CONTENT);
        assert_eq!(response.header(CONTENT_LENGTH), Some("1024"));
        assert_eq!(response.header(CONTENT_RANGE), Some("bytes 0-1023/5242880"));
        assert_eq!(response.header(ACCEPT_RANGES), Some("bytes"));
        assert_eq!(read_body(response), &bytes[..1024]);
    }

    #[test]
    fn test_start_past_end_is_unsatisfiable() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "big.bin", &patterned(FIVE_MIB));

        let response = store
            .serve(EXERCISE, "big.bin", Some("bytes=10000000-"))
            .unwrap();
        assert_eq!(response.status, STATUS_RANGE_NOT_SATISFIABLE);
        assert_eq!(response.header(CONTENT_RANGE), Some("bytes */5242880"));
        assert_eq!(response.header(ACCEPT_RANGES), Some("bytes"));
        assert!(response.body.is_none());
    }

    #[test]
    fn test_open_and_clamped_ends() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "notes.txt", b"abcdefghij");

        let response = store
            .serve(EXERCISE, "notes.txt", Some("bytes=7-"))
            .unwrap();
        assert_eq!(response.header(CONTENT_RANGE), Some("bytes 7-9/10"));
        assert_eq!(read_body(response), b"hij");

        let response = store
            .serve(EXERCISE, "notes.txt", Some("bytes=8-999"))
            .unwrap();
        assert_eq!(response.status, STATUS_PARTIAL_CONTENT);
        assert_eq!(response.header(CONTENT_LENGTH), Some("2"));
        assert_eq!(response.header(CONTENT_RANGE), Some("bytes 8-9/10"));
        assert_eq!(read_body(response), b"ij");
    }

    #[test]
    fn test_malformed_range_serves_everything() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "notes.txt", b"abcdefghij");

        let response = store
            .serve(EXERCISE, "notes.txt", Some("bytes=-3"))
            .unwrap();
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.header(CONTENT_LENGTH), Some("10"));
        assert_eq!(read_body(response), b"abcdefghij");
    }

    #[test]
    fn test_serve_missing_or_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "a.txt", b"a");

        let err = store.serve(EXERCISE, "missing.txt", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.serve(EXERCISE, "../exercise.json", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        let err = store.serve("KungFu", "a.txt", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_body_reports_remaining() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with_file(&temp_dir, "a.txt", b"abcdef");

        let response = store.serve(EXERCISE, "a.txt", Some("bytes=1-3")).unwrap();
        let mut body = response.body.unwrap();
        assert_eq!(body.remaining(), 3);
        let mut buf = [0u8; 2];
        body.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"bc");
        assert_eq!(body.remaining(), 1);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Well-formed single ranges parse back to their bounds
        #[test]
        fn prop_parse_accepts_ordered_bounds(start in 0u64..1_000_000, extra in 0u64..1_000_000) {
            let header = format!("bytes={}-{}", start, start + extra);
            prop_assert_eq!(
                ByteRange::parse(&header),
                Some(ByteRange { start, end: Some(start + extra) })
            );
        }

        /// Served windows are clamped to the file and match its bytes
        #[test]
        fn prop_window_matches_file(len in 1usize..512, start in 0u64..600, span in 0u64..600) {
            let temp_dir = TempDir::new().unwrap();
            let bytes = patterned(len);
            let store = store_with_file(&temp_dir, "data.bin", &bytes);
            let header = format!("bytes={}-{}", start, start + span);

            let response = store.serve(EXERCISE, "data.bin", Some(&header)).unwrap();
            let len = len as u64;
            if start >= len {
                prop_assert_eq!(response.status, STATUS_RANGE_NOT_SATISFIABLE);
                prop_assert!(response.body.is_none());
            } else {
                let end = (start + span).min(len - 1);
                prop_assert_eq!(response.status, STATUS_PARTIAL_CONTENT);
                let expected_len = (end - start + 1).to_string();
                prop_assert_eq!(response.header(CONTENT_LENGTH), Some(expected_len.as_str()));
                let body = read_body(response);
                prop_assert_eq!(&body[..], &bytes[start as usize..=end as usize]);
            }
        }
    }
}
