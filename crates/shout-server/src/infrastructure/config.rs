//! TOML configuration file for the server.
//!
//! Every field has a serde default, so an absent file, an empty file, or a
//! file that sets only a music directory all produce a working server.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8888
//! public_host = "radio.example.org"
//! log_level = "info"
//!
//! [stream]
//! name = "Shout mix"
//! genre = "Jazz Classical Rock"
//! metaint = 32768
//! bitrate_kbps = 128
//!
//! [source]
//! kind = "directory"
//! path = "/srv/music"
//! extensions = ["mp3"]
//! on_exhausted = "restart"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  The defaults
//! mirror [`StreamConfig::default`] so the file and the core agree.
//!
//! [`ServerConfig::resolve`] turns the file representation into the typed
//! values the dispatcher and the connections consume.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shout_core::domain::config::{DEFAULT_CHUNKS_PER_REFILL, DEFAULT_CHUNK_SIZE};
use shout_core::{ExhaustionPolicy, SongSource, StreamConfig, StreamConfigError};
use thiserror::Error;
use tracing::warn;

use super::dispatcher::DispatchOptions;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    /// A stream sizing value is out of range.
    #[error("invalid [stream] settings: {0}")]
    InvalidStream(#[from] StreamConfigError),

    /// The `[source]` section does not name anything to play.
    #[error("no song source configured: {0}")]
    MissingSource(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub source: SourceSection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host advertised in `icy-url`.  Defaults to the bind address, or to
    /// `localhost` when binding every interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// What listeners are told about the stream, and buffer sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_genre")]
    pub genre: String,
    #[serde(default = "default_notice1")]
    pub notice1: String,
    #[serde(default = "default_notice2")]
    pub notice2: String,
    /// Audio bytes between metadata blocks.
    #[serde(default = "default_chunk_size")]
    pub metaint: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunks_per_refill")]
    pub chunks_per_refill: usize,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// How long to wait for the client's request before the first write.
    #[serde(default = "default_request_window_ms")]
    pub request_window_ms: u64,
    /// Close a client whose socket accepts nothing for this long.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

/// Kind of song source.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Every matching file under `path`, in sorted order.
    #[default]
    Directory,
    /// The files listed in `tracks`, in order.
    Playlist,
}

/// Where the tracks come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSection {
    #[serde(default)]
    pub kind: SourceKind,
    /// Root directory for `kind = "directory"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Files for `kind = "playlist"`.
    #[serde(default)]
    pub tracks: Vec<PathBuf>,
    /// File extensions a directory walk accepts, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_name() -> String {
    StreamConfig::default().name
}
fn default_genre() -> String {
    StreamConfig::default().genre
}
fn default_notice1() -> String {
    StreamConfig::default().notice1
}
fn default_notice2() -> String {
    StreamConfig::default().notice2
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunks_per_refill() -> usize {
    DEFAULT_CHUNKS_PER_REFILL
}
fn default_bitrate_kbps() -> u32 {
    128
}
fn default_max_consecutive_failures() -> u32 {
    8
}
fn default_request_window_ms() -> u64 {
    500
}
fn default_stall_timeout_secs() -> u64 {
    30
}
fn default_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            public_host: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            genre: default_genre(),
            notice1: default_notice1(),
            notice2: default_notice2(),
            metaint: default_chunk_size(),
            chunk_size: default_chunk_size(),
            chunks_per_refill: default_chunks_per_refill(),
            bitrate_kbps: default_bitrate_kbps(),
            max_consecutive_failures: default_max_consecutive_failures(),
            request_window_ms: default_request_window_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: None,
            tracks: Vec::new(),
            extensions: default_extensions(),
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Typed settings ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub listen_addr: SocketAddr,
    pub stream: StreamConfig,
    pub source: SongSource,
    pub dispatch: DispatchOptions,
}

impl ServerConfig {
    /// Validates the file contents and converts them into typed values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] for an unparsable bind address,
    /// [`ConfigError::InvalidStream`] for zero sizes or a refill budget below
    /// two metadata intervals, and
    /// [`ConfigError::MissingSource`] when no directory or tracks are given.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let ip: IpAddr =
            self.server
                .bind_address
                .parse()
                .map_err(|source| ConfigError::InvalidAddress {
                    address: self.server.bind_address.clone(),
                    source,
                })?;
        let listen_addr = SocketAddr::new(ip, self.server.port);

        let public_host = match &self.server.public_host {
            Some(host) => host.clone(),
            None => advertised_host(ip),
        };

        let stream = StreamConfig {
            public_host,
            public_port: self.server.port,
            name: self.stream.name.clone(),
            genre: self.stream.genre.clone(),
            notice1: self.stream.notice1.clone(),
            notice2: self.stream.notice2.clone(),
            metaint: self.stream.metaint,
            chunk_size: self.stream.chunk_size,
            chunks_per_refill: self.stream.chunks_per_refill,
            bitrate_kbps: self.stream.bitrate_kbps,
            max_consecutive_failures: self.stream.max_consecutive_failures,
        };
        stream.validate()?;

        let source = match self.source.kind {
            SourceKind::Directory => {
                let root = self.source.path.clone().ok_or_else(|| {
                    ConfigError::MissingSource(
                        "a directory source needs `path` (or --music-dir)".to_string(),
                    )
                })?;
                SongSource::Directory {
                    root,
                    extensions: self.source.extensions.clone(),
                    policy: self.source.on_exhausted,
                }
            }
            SourceKind::Playlist => {
                if self.source.tracks.is_empty() {
                    return Err(ConfigError::MissingSource(
                        "a playlist source needs at least one entry in `tracks`".to_string(),
                    ));
                }
                SongSource::Playlist {
                    tracks: self.source.tracks.clone(),
                    policy: self.source.on_exhausted,
                }
            }
        };

        Ok(ResolvedConfig {
            listen_addr,
            stream,
            source,
            dispatch: DispatchOptions {
                request_window: Duration::from_millis(self.stream.request_window_ms),
                stall_timeout: Duration::from_secs(self.stream.stall_timeout_secs),
            },
        })
    }
}

/// Host to put in `icy-url` when `public_host` is not set.
fn advertised_host(ip: IpAddr) -> String {
    if ip.is_unspecified() {
        warn!("binding {ip} without `public_host`; advertising http://localhost in icy-url");
        return "localhost".to_string();
    }
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Loads a [`ServerConfig`] from `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (including when it
/// does not exist) and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: ServerConfig = toml::from_str(&content)?;
    Ok(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn with_music_dir() -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.source.path = Some(PathBuf::from("/srv/music"));
        cfg
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_listens_on_localhost_8888() {
        // Arrange / Act
        let resolved = with_music_dir().resolve().unwrap();

        // Assert
        assert_eq!(resolved.listen_addr.to_string(), "127.0.0.1:8888");
        assert_eq!(resolved.stream.public_host, "127.0.0.1");
        assert_eq!(resolved.stream.public_port, 8888);
    }

    #[test]
    fn test_default_stream_section_matches_core_defaults() {
        let resolved = with_music_dir().resolve().unwrap();
        let core = StreamConfig::default();
        assert_eq!(resolved.stream.metaint, core.metaint);
        assert_eq!(resolved.stream.chunk_size, core.chunk_size);
        assert_eq!(resolved.stream.chunks_per_refill, core.chunks_per_refill);
        assert_eq!(resolved.stream.name, core.name);
        assert_eq!(resolved.stream.bitrate_kbps, core.bitrate_kbps);
        assert_eq!(
            resolved.stream.max_consecutive_failures,
            core.max_consecutive_failures
        );
    }

    #[test]
    fn test_default_dispatch_options() {
        let resolved = with_music_dir().resolve().unwrap();
        assert_eq!(resolved.dispatch.request_window, Duration::from_millis(500));
        assert_eq!(resolved.dispatch.stall_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_full_file() {
        // Arrange
        let text = r#"
            [server]
            bind_address = "0.0.0.0"
            port = 9000
            public_host = "radio.example.org"
            log_level = "debug"

            [stream]
            name = "Night shift"
            metaint = 8192
            stall_timeout_secs = 5

            [source]
            kind = "playlist"
            tracks = ["/music/a.mp3", "/music/b.mp3"]
            on_exhausted = "stop"
        "#;

        // Act
        let cfg: ServerConfig = toml::from_str(text).unwrap();
        let resolved = cfg.resolve().unwrap();

        // Assert
        assert_eq!(resolved.listen_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(resolved.stream.public_host, "radio.example.org");
        assert_eq!(resolved.stream.name, "Night shift");
        assert_eq!(resolved.stream.metaint, 8192);
        assert_eq!(resolved.stream.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(resolved.dispatch.stall_timeout, Duration::from_secs(5));
        assert_eq!(cfg.server.log_level, "debug");
        assert_eq!(
            resolved.source,
            SongSource::Playlist {
                tracks: vec![PathBuf::from("/music/a.mp3"), PathBuf::from("/music/b.mp3")],
                policy: ExhaustionPolicy::Stop,
            }
        );
    }

    #[test]
    fn test_directory_source_defaults_to_mp3_and_restart() {
        let cfg: ServerConfig = toml::from_str("[source]\npath = \"/srv/music\"\n").unwrap();
        assert_eq!(
            cfg.resolve().unwrap().source,
            SongSource::Directory {
                root: PathBuf::from("/srv/music"),
                extensions: vec!["mp3".to_string()],
                policy: ExhaustionPolicy::Restart,
            }
        );
    }

    #[test]
    fn test_unknown_exhaustion_policy_is_parse_error() {
        let result: Result<ServerConfig, _> = toml::from_str("[source]\non_exhausted = \"loop\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut cfg = with_music_dir();
        cfg.server.port = 7000;
        cfg.source.on_exhausted = ExhaustionPolicy::Stop;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&text).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    // ── Resolution errors ─────────────────────────────────────────────────────

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let mut cfg = with_music_dir();
        cfg.server.bind_address = "not.an.ip".to_string();
        assert!(matches!(
            cfg.resolve(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_unspecified_bind_advertises_localhost() {
        let mut cfg = with_music_dir();
        cfg.server.bind_address = "0.0.0.0".to_string();

        let resolved = cfg.resolve().unwrap();

        assert_eq!(resolved.listen_addr.to_string(), "0.0.0.0:8888");
        assert_eq!(resolved.stream.public_host, "localhost");
    }

    #[test]
    fn test_ipv6_bind_address_is_accepted() {
        // Arrange
        let mut cfg = with_music_dir();
        cfg.server.bind_address = "::1".to_string();
        cfg.server.port = 9000;

        // Act
        let resolved = cfg.resolve().unwrap();

        // Assert
        assert_eq!(resolved.listen_addr, "[::1]:9000".parse().unwrap());
        assert_eq!(resolved.stream.public_host, "[::1]");
    }

    #[test]
    fn test_small_refill_budget_is_rejected() {
        let mut cfg = with_music_dir();
        cfg.stream.chunks_per_refill = 1;
        assert!(matches!(
            cfg.resolve(),
            Err(ConfigError::InvalidStream(
                StreamConfigError::RefillBudgetTooSmall { .. }
            ))
        ));
    }

    #[test]
    fn test_zero_metaint_is_rejected() {
        let mut cfg = with_music_dir();
        cfg.stream.metaint = 0;
        assert!(matches!(
            cfg.resolve(),
            Err(ConfigError::InvalidStream(StreamConfigError::ZeroMetaint))
        ));
    }

    #[test]
    fn test_directory_without_path_is_missing_source() {
        let cfg = ServerConfig::default();
        assert!(matches!(cfg.resolve(), Err(ConfigError::MissingSource(_))));
    }

    #[test]
    fn test_empty_playlist_is_missing_source() {
        let mut cfg = ServerConfig::default();
        cfg.source.kind = SourceKind::Playlist;
        assert!(matches!(cfg.resolve(), Err(ConfigError::MissingSource(_))));
    }

    // ── load_config ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_reads_file() {
        let path = std::env::temp_dir().join(format!("shout_cfg_{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[server]\nport = 8001\n").unwrap();

        let cfg = load_config(&path).unwrap();

        assert_eq!(cfg.server.port, 8001);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_config_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/shout.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!("shout_cfg_{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[server\nport = ").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }
}
