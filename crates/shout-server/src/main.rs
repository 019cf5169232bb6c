//! Shout streaming server: entry point.
//!
//! Serves a directory or playlist of MP3 files as an ICY (SHOUTcast) stream.
//! Every listener gets its own position in the song source; players that send
//! `Icy-MetaData: 1` also receive the current track title every `icy-metaint`
//! audio bytes.
//!
//! # Usage
//!
//! ```text
//! shout-server [OPTIONS]
//!
//! Options:
//!   --config    <FILE>  TOML configuration file
//!   --bind      <ADDR>  IP address to listen on [config default: 127.0.0.1]
//!   --port      <PORT>  TCP port to listen on [config default: 8888]
//!   --music-dir <DIR>   Stream every .mp3 under this directory
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present; both take precedence over
//! the configuration file.
//!
//! | Variable          | Description                         |
//! |-------------------|-------------------------------------|
//! | `SHOUT_CONFIG`    | Path of the TOML configuration file |
//! | `SHOUT_BIND`      | Listen address                      |
//! | `SHOUT_PORT`      | Listen port                         |
//! | `SHOUT_MUSIC_DIR` | Music directory                     |
//! | `RUST_LOG`        | Log filter (overrides `log_level`)  |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shout_core::{Id3TagReader, SongCatalog, TagReader};
use shout_server::infrastructure::config::SourceKind;
use shout_server::infrastructure::{load_config, Dispatcher, ResolvedConfig, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ICY/SHOUTcast streaming server.
#[derive(Debug, Parser)]
#[command(
    name = "shout-server",
    about = "Streams a music directory to ICY/SHOUTcast listeners",
    version
)]
struct Cli {
    /// TOML configuration file.  Built-in defaults apply when omitted.
    #[arg(long, env = "SHOUT_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind, e.g. `0.0.0.0` for every interface.
    #[arg(long, env = "SHOUT_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "SHOUT_PORT")]
    port: Option<u16>,

    /// Directory to stream; replaces the `[source]` section of the file.
    #[arg(long, env = "SHOUT_MUSIC_DIR")]
    music_dir: Option<PathBuf>,
}

impl Cli {
    /// Loads the configuration file (if any) and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or
    /// parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            cfg.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(dir) = self.music_dir {
            cfg.source.kind = SourceKind::Directory;
            cfg.source.path = Some(dir);
        }
        Ok(cfg)
    }
}

/// Binds the listener described by `resolved`.
async fn build_dispatcher(resolved: ResolvedConfig) -> anyhow::Result<Dispatcher> {
    let catalog: Arc<dyn SongCatalog> = Arc::new(resolved.source);
    let tags: Arc<dyn TagReader> = Arc::new(Id3TagReader);
    let dispatcher = Dispatcher::bind(
        resolved.listen_addr,
        Arc::new(resolved.stream),
        catalog,
        tags,
        resolved.dispatch,
    )
    .await?;
    Ok(dispatcher)
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// A single-threaded runtime is enough: every client task only waits for
/// socket readiness, and connection callbacks never block on each other.
///
/// # What happens at startup
///
/// 1. CLI arguments and the configuration file are merged.
/// 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to the
///    configured `log_level`.
/// 3. The merged configuration is validated.
/// 4. The listener is bound; failure here is fatal.
/// 5. A Ctrl+C handler clears the shared `running` flag.
/// 6. [`Dispatcher::run`] serves listeners until the flag is cleared.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.into_server_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    let resolved = cfg.resolve().context("invalid configuration")?;

    info!(
        "shout-server starting: listen={}, source={:?}",
        resolved.listen_addr, resolved.source
    );

    let dispatcher = build_dispatcher(resolved).await?;

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    dispatcher.run(running).await;

    info!("shout-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
