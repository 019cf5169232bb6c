//! Where audio bytes come from.
//!
//! - **`provider`** – Song providers and catalogs: which file plays next.
//! - **`tags`** – Title and audio offset of a file.
//! - **`audio`** – Sequential reads from the open track.

pub mod audio;
pub mod provider;
pub mod tags;

pub use audio::{AudioSource, SourceError};
pub use provider::{
    DirectoryProvider, ExhaustionPolicy, PlaylistProvider, ProviderError, SongCatalog,
    SongProvider, SongSource,
};
pub use tags::{id3v2_tag_len, Id3TagReader, NoTags, TagReader, TrackTags};
