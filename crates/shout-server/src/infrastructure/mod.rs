//! Infrastructure layer for shout-server.
//!
//! The infrastructure layer handles all I/O that the core crate leaves out:
//! reading the configuration file, binding the listener, and moving bytes
//! between sockets and [`shout_core::Connection`]s.
//!
//! # What does NOT belong here?
//!
//! - Protocol encoding and the streaming state machine (that is `shout-core`)
//! - Command-line parsing (that is done in `main.rs`)

pub mod config;
pub mod dispatcher;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config::{load_config, ConfigError, ResolvedConfig, ServerConfig};
pub use dispatcher::{DispatchOptions, Dispatcher, ServerError};
