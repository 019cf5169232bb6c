//! ICY in-band metadata blocks.
//!
//! Wire format:
//! ```text
//! [length:1][text:length*16]
//! ```
//! `text` is `StreamTitle='<title>';` padded with zero bytes up to
//! `length * 16`.  A length byte of 0 means "no change" to a client, but this
//! encoder always emits at least one block because the wrapper text alone is
//! 15 bytes long.
//!
//! Quote characters inside the title are sent as-is.  Existing clients
//! expect that literal form, so no escaping is applied.

/// Size of one metadata block unit in bytes.
pub const METADATA_BLOCK_UNIT: usize = 16;

/// Largest block count a single length byte can express.
pub const MAX_METADATA_BLOCKS: usize = u8::MAX as usize;

const TITLE_PREFIX: &str = "StreamTitle='";
const TITLE_SUFFIX: &str = "';";

/// Encodes `title` into a length-prefixed, zero-padded ICY metadata block.
///
/// The returned vector always satisfies `len % 16 == 1`, and its first byte
/// equals `(len - 1) / 16`.  Titles too long for 255 blocks are truncated on
/// a character boundary so the closing `';` is always present.
///
/// # Examples
///
/// ```rust
/// use shout_core::protocol::encode_metadata;
///
/// let block = encode_metadata("");
/// assert_eq!(block.len(), 17);
/// assert_eq!(block[0], 1);
/// assert_eq!(&block[1..16], b"StreamTitle='';");
/// ```
pub fn encode_metadata(title: &str) -> Vec<u8> {
    let title = truncate_title(title);
    let text_len = TITLE_PREFIX.len() + title.len() + TITLE_SUFFIX.len();
    let blocks = text_len.div_ceil(METADATA_BLOCK_UNIT);
    let padded_len = blocks * METADATA_BLOCK_UNIT;

    let mut out = Vec::with_capacity(1 + padded_len);
    // `truncate_title` guarantees blocks <= 255.
    out.push(blocks as u8);
    out.extend_from_slice(TITLE_PREFIX.as_bytes());
    out.extend_from_slice(title.as_bytes());
    out.extend_from_slice(TITLE_SUFFIX.as_bytes());
    out.resize(1 + padded_len, 0);
    out
}

/// Recovers the `StreamTitle` value from an encoded block.
///
/// Returns `None` when the length byte disagrees with the block size, the
/// text is not UTF-8, or the `StreamTitle='...';` wrapper is missing.
pub fn decode_metadata(block: &[u8]) -> Option<String> {
    let (&blocks, body) = block.split_first()?;
    if body.len() != blocks as usize * METADATA_BLOCK_UNIT {
        return None;
    }
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let text = std::str::from_utf8(&body[..end]).ok()?;
    text.strip_prefix(TITLE_PREFIX)?
        .strip_suffix(TITLE_SUFFIX)
        .map(str::to_owned)
}

/// Cuts `title` so the whole wrapped text fits in [`MAX_METADATA_BLOCKS`].
fn truncate_title(title: &str) -> &str {
    let budget =
        MAX_METADATA_BLOCKS * METADATA_BLOCK_UNIT - TITLE_PREFIX.len() - TITLE_SUFFIX.len();
    if title.len() <= budget {
        return title;
    }
    let mut cut = budget;
    while !title.is_char_boundary(cut) {
        cut -= 1;
    }
    &title[..cut]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_block_invariants(block: &[u8]) {
        assert_eq!(block.len() % METADATA_BLOCK_UNIT, 1, "len % 16 must be 1");
        assert_eq!(
            block[0] as usize,
            (block.len() - 1) / METADATA_BLOCK_UNIT,
            "length byte must count the 16-byte blocks that follow"
        );
    }

    #[test]
    fn test_empty_title_fits_one_block() {
        // Arrange / Act
        let block = encode_metadata("");

        // Assert: "StreamTitle='';" is 15 bytes, padded with one zero
        assert_eq!(block.len(), 17);
        assert_eq!(block[0], 1);
        assert_eq!(&block[1..16], b"StreamTitle='';");
        assert_eq!(block[16], 0);
    }

    #[test]
    fn test_exact_multiple_of_sixteen_has_no_padding() {
        // "StreamTitle='" (13) + "a" + "';" (2) = 16 bytes exactly
        let block = encode_metadata("a");
        assert_eq!(block[0], 1);
        assert_eq!(block.len(), 17);
        assert_eq!(&block[1..], b"StreamTitle='a';");
    }

    #[test]
    fn test_one_byte_over_a_block_rounds_up() {
        let block = encode_metadata("ab");
        assert_eq!(block[0], 2);
        assert_eq!(block.len(), 33);
        assert!(block[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invariants_hold_across_title_lengths() {
        for n in 0..200 {
            let title = "x".repeat(n);
            assert_block_invariants(&encode_metadata(&title));
        }
    }

    #[test]
    fn test_embedded_quotes_are_not_escaped() {
        let block = encode_metadata("Don't Stop");
        let text = String::from_utf8_lossy(&block[1..]);
        assert!(text.starts_with("StreamTitle='Don't Stop';"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode_metadata("Camel - Supertwister"), encode_metadata("Camel - Supertwister"));
    }

    #[test]
    fn test_oversized_title_is_truncated_to_max_blocks() {
        // Arrange
        let title = "y".repeat(10_000);

        // Act
        let block = encode_metadata(&title);

        // Assert
        assert_eq!(block[0] as usize, MAX_METADATA_BLOCKS);
        assert_block_invariants(&block);
        let decoded = decode_metadata(&block).expect("wrapper must survive truncation");
        assert_eq!(decoded.len(), MAX_METADATA_BLOCKS * 16 - 15);
    }

    #[test]
    fn test_truncation_respects_utf8_boundaries() {
        let title = "é".repeat(4_000);
        let block = encode_metadata(&title);
        assert_block_invariants(&block);
        let decoded = decode_metadata(&block).expect("must stay valid UTF-8");
        assert!(decoded.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_decode_recovers_title() {
        let block = encode_metadata("Miles Davis - So What");
        assert_eq!(decode_metadata(&block).as_deref(), Some("Miles Davis - So What"));
    }

    #[test]
    fn test_decode_rejects_wrong_length_byte() {
        let mut block = encode_metadata("abc");
        block[0] = 7;
        assert_eq!(decode_metadata(&block), None);
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert_eq!(decode_metadata(&[]), None);
    }
}
