//! Track tag reading.
//!
//! The streaming core only needs two facts about a file: a title for the
//! metadata blocks, and the byte offset where audio starts so the leading
//! tag is not sent to listeners.  [`TagReader`] is the seam; [`Id3TagReader`]
//! is the production implementation.
//!
//! A missing or malformed tag is never an error.  It yields an empty title
//! and an offset of zero, and streaming goes on.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use id3::TagLike;
use tracing::debug;

/// Length of an ID3v2 header (and of its optional footer).
const ID3V2_HEADER_LEN: u64 = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// What the streaming core needs to know about a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    /// Title sent in metadata blocks; empty when unknown.
    pub title: String,
    /// First byte of audio data; 0 when there is no leading tag.
    pub audio_offset: u64,
}

/// Extracts [`TrackTags`] from a file.
pub trait TagReader: Send + Sync {
    /// Reads the tags of `path`.  Never fails; unknown means default.
    fn read_tags(&self, path: &Path) -> TrackTags;
}

/// Reads the title from an ID3v2 tag, falling back to a trailing ID3v1 tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3TagReader;

impl TagReader for Id3TagReader {
    fn read_tags(&self, path: &Path) -> TrackTags {
        let title = match id3::v1v2::read_from_path(path) {
            Ok(tag) => tag.title().unwrap_or_default().to_string(),
            Err(e) => {
                debug!("no usable ID3 tag in {}: {e}", path.display());
                String::new()
            }
        };
        let audio_offset = read_header(path)
            .as_deref()
            .and_then(id3v2_tag_len)
            .unwrap_or(0);
        TrackTags {
            title,
            audio_offset,
        }
    }
}

/// Ignores tags entirely: empty title, audio from byte 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagReader for NoTags {
    fn read_tags(&self, _path: &Path) -> TrackTags {
        TrackTags::default()
    }
}

/// Total length of the ID3v2 tag described by a 10-byte header, including
/// the header itself and the footer when the footer flag is set.
///
/// Returns `None` if `header` is not an ID3v2 header.
pub fn id3v2_tag_len(header: &[u8]) -> Option<u64> {
    if header.len() < ID3V2_HEADER_LEN as usize || &header[..3] != b"ID3" {
        return None;
    }
    let size_bytes = &header[6..10];
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    // Syncsafe integer: 7 significant bits per byte.
    let size = size_bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7F));
    let footer = if header[5] & ID3V2_FOOTER_FLAG != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN + size + footer)
}

fn read_header(path: &Path) -> Option<Vec<u8>> {
    let mut header = vec![0u8; ID3V2_HEADER_LEN as usize];
    File::open(path).ok()?.read_exact(&mut header).ok()?;
    Some(header)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
