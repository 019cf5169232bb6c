//! shout-server library crate.
//!
//! An ICY (SHOUTcast-compatible) streaming server: every listener that
//! connects gets the ICY header block and then an endless MP3 stream, with
//! track titles interleaved for players that ask for them.
//!
//! # Architecture
//!
//! ```text
//! Listener (Winamp, VLC, mpv, ...)
//!         ↕  TCP
//! [shout-server]
//!   └── infrastructure/
//!         ├── config/      TOML file → ResolvedConfig
//!         └── dispatcher/  accept loop + one task per socket
//!         ↕
//! [shout-core]  Connection state machine, ICY encoding, song sources
//! ```
//!
//! # Layer rules
//!
//! - `shout-core` owns no sockets and no runtime.
//! - `infrastructure` depends on `shout-core` plus `tokio` and `toml`.

/// Infrastructure layer: configuration file and socket dispatcher.
pub mod infrastructure;
