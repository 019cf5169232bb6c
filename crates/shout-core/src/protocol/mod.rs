//! Protocol module: the ICY handshake and in-band metadata blocks.

pub mod handshake;
pub mod metadata;

pub use handshake::{requests_metadata, IcyResponse, METADATA_REQUEST_HEADER};
pub use metadata::{decode_metadata, encode_metadata, MAX_METADATA_BLOCKS, METADATA_BLOCK_UNIT};
