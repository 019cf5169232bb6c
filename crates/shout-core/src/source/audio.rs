//! Sequential reader over one track file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::tags::TagReader;

/// A track could not be opened.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot skip leading tag of {path}: {source}")]
    Seek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An open track, owned by exactly one connection.
///
/// The file handle is released when the value is dropped.
#[derive(Debug)]
pub struct AudioSource {
    path: PathBuf,
    file: File,
    size: u64,
    cursor: u64,
    title: String,
}

impl AudioSource {
    /// Opens `path`, reads its tags, and positions the cursor at the first
    /// audio byte.
    ///
    /// The leading tag is skipped only when its reported length is non-zero
    /// and smaller than the file; otherwise reading starts at byte 0.
    ///
    /// # Errors
    ///
    /// [`SourceError::Open`] for a missing or unreadable file,
    /// [`SourceError::Seek`] if skipping the tag fails.
    pub fn open(path: &Path, tags: &dyn TagReader) -> Result<Self, SourceError> {
        let open_err = |source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();

        let track = tags.read_tags(path);
        let mut cursor = 0;
        if track.audio_offset > 0 && track.audio_offset < size {
            file.seek(SeekFrom::Start(track.audio_offset))
                .map_err(|source| SourceError::Seek {
                    path: path.to_path_buf(),
                    source,
                })?;
            cursor = track.audio_offset;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            cursor,
            title: track.title,
        })
    }

    /// Appends up to `max` bytes to `out` and returns how many were added.
    ///
    /// Returns `Ok(0)` at end of file.
    pub fn read_into(&mut self, out: &mut Vec<u8>, max: usize) -> io::Result<usize> {
        let n = (&mut self.file).take(max as u64).read_to_end(out)?;
        self.cursor += n as u64;
        Ok(n)
    }

    /// `true` once every byte of the file has been read.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tags::{NoTags, TrackTags};
    use uuid::Uuid;

    struct FixedTags(TrackTags);

    impl TagReader for FixedTags {
        fn read_tags(&self, _path: &Path) -> TrackTags {
            self.0.clone()
        }
    }

    fn temp_file(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("shout_audio_{}.mp3", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_open_untagged_file_starts_at_zero() {
        let path = temp_file(b"ABCDEFGHIJ");
        let source = AudioSource::open(&path, &NoTags).unwrap();
        assert_eq!(source.size(), 10);
        assert_eq!(source.cursor(), 0);
        assert_eq!(source.title(), "");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_into_respects_max_and_advances_cursor() {
        // Arrange
        let path = temp_file(b"ABCDEFGHIJ");
        let mut source = AudioSource::open(&path, &NoTags).unwrap();
        let mut out = Vec::new();

        // Act
        let first = source.read_into(&mut out, 4).unwrap();
        let second = source.read_into(&mut out, 100).unwrap();
        let third = source.read_into(&mut out, 100).unwrap();

        // Assert
        assert_eq!((first, second, third), (4, 6, 0));
        assert_eq!(out, b"ABCDEFGHIJ");
        assert!(source.is_exhausted());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_skips_leading_tag_bytes() {
        let path = temp_file(b"TAGTAGaudio");
        let tags = FixedTags(TrackTags {
            title: "Song".to_string(),
            audio_offset: 6,
        });

        let mut source = AudioSource::open(&path, &tags).unwrap();
        let mut out = Vec::new();
        source.read_into(&mut out, 64).unwrap();

        assert_eq!(out, b"audio");
        assert_eq!(source.title(), "Song");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_ignores_offset_not_smaller_than_file() {
        let path = temp_file(b"short");
        let tags = FixedTags(TrackTags {
            title: String::new(),
            audio_offset: 5,
        });

        let mut source = AudioSource::open(&path, &tags).unwrap();
        let mut out = Vec::new();
        source.read_into(&mut out, 64).unwrap();

        assert_eq!(out, b"short");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_zero_size_file_is_immediately_exhausted() {
        let path = temp_file(b"");
        let mut source = AudioSource::open(&path, &NoTags).unwrap();
        assert!(source.is_exhausted());
        assert_eq!(source.read_into(&mut Vec::new(), 16).unwrap(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_missing_file_is_open_error() {
        let result = AudioSource::open(Path::new("/nonexistent/track.mp3"), &NoTags);
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}
