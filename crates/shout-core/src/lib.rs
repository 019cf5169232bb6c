//! # shout-core
//!
//! Core library of the Shout streaming server: the ICY wire format, song
//! sources, and the state machine that streams one listener.
//!
//! The crate performs file I/O for the tracks it plays but owns no sockets.
//! The `shout-server` binary drives it from a Tokio event loop.
//!
//! # Architecture overview (for beginners)
//!
//! An ICY (SHOUTcast) stream is an HTTP-like response that never ends.  The
//! server answers a listener's request with an `ICY 200 OK` header block and
//! then sends MP3 bytes forever.  Players that ask for it with
//! `Icy-MetaData: 1` also receive a small title block after every
//! `icy-metaint` audio bytes.
//!
//! - **`protocol`** – Byte-level encoding: the handshake header block and the
//!   length-prefixed, zero-padded metadata block.
//!
//! - **`source`** – Where audio comes from.  A song provider chooses the next
//!   file, the tag reader finds its title and the first audio byte, and the
//!   audio source reads it sequentially.
//!
//! - **`domain`** – The stream configuration and the per-connection state
//!   machine that interleaves audio with metadata.

pub mod domain;
pub mod protocol;
pub mod source;

// Re-export the most-used types at the crate root so callers can write
// `shout_core::Connection` instead of `shout_core::domain::connection::Connection`.
pub use domain::config::{StreamConfig, StreamConfigError};
pub use domain::connection::{
    CloseReason, Connection, ConnectionId, ConnectionState, WriteOutcome,
};
pub use protocol::{decode_metadata, encode_metadata, requests_metadata, IcyResponse};
pub use source::{
    AudioSource, ExhaustionPolicy, Id3TagReader, NoTags, ProviderError, SongCatalog,
    SongProvider, SongSource, TagReader,
};
