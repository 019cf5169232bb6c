//! Streaming domain: configuration values and the per-connection state
//! machine.
//!
//! # Why is the connection "sans-IO"? (for beginners)
//!
//! A [`connection::Connection`] never touches a socket.  The dispatcher owns
//! the socket and calls into the connection whenever the socket becomes
//! readable or writable, passing the bytes it read or a writer it may write
//! into.  That keeps every protocol rule (handshake first, metadata exactly
//! every `metaint` audio bytes, partial writes resumed) testable with a plain
//! `Vec<u8>` instead of a real TCP connection.

/// Server-wide stream settings.
pub mod config;

/// Per-client streaming state machine.
///
/// See [`connection::Connection`] for the main type.
pub mod connection;
