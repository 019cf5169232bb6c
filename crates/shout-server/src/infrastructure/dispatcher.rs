//! Listener accept loop and per-client socket tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener.
//! 2. Accepting listeners' connections and giving each one a fresh
//!    [`Connection`] with its own song provider.
//! 3. Running one Tokio task per socket that waits for readiness and calls
//!    [`Connection::on_readable`] / [`Connection::on_writable`].
//! 4. Closing every client with [`CloseReason::Shutdown`] once the `running`
//!    flag is cleared.
//!
//! # Scheduling
//!
//! The binary runs on Tokio's current-thread runtime, so every client task
//! shares one thread and a connection callback always runs to completion
//! before another task is polled.  Track files are read synchronously inside
//! the writable callback; a slow disk delays every listener, not just one.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use shout_core::{CloseReason, Connection, SongCatalog, StreamConfig, TagReader, WriteOutcome};
use thiserror::Error;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Size of the buffer client requests are read into.
const READ_BUF_SIZE: usize = 4096;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Per-client timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// How long to wait for the client's request before the first write, so
    /// `Icy-MetaData` is known before any audio goes out.
    pub request_window: Duration,
    /// Close a client whose socket accepts nothing for this long.
    pub stall_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            request_window: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the listening socket and everything a new connection needs.
pub struct Dispatcher {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<StreamConfig>,
    catalog: Arc<dyn SongCatalog>,
    tags: Arc<dyn TagReader>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Binds `addr` and prepares to accept listeners.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the port is in use or the process
    /// lacks permission to bind it.
    pub async fn bind(
        addr: SocketAddr,
        config: Arc<StreamConfig>,
        catalog: Arc<dyn SongCatalog>,
        tags: Arc<dyn TagReader>,
        options: DispatchOptions,
    ) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind { addr, source };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!("streaming on {local_addr} (metaint {})", config.metaint);
        Ok(Self {
            listener,
            local_addr,
            config,
            catalog,
            tags,
            options,
        })
    }

    /// Address actually bound; differs from the requested one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts listeners until `running` is set to `false`, then closes every
    /// open client and waits for their tasks to finish.
    pub async fn run(self, running: Arc<AtomicBool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut clients = JoinSet::new();

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the flag is checked even when nobody connects.
            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    let conn = Connection::new(
                        Uuid::new_v4(),
                        Arc::clone(&self.config),
                        self.catalog.open_provider(),
                        Arc::clone(&self.tags),
                    );
                    info!("connection {} accepted from {peer_addr}", conn.id());
                    clients.spawn(serve_client(
                        stream,
                        conn,
                        self.options,
                        shutdown_rx.clone(),
                    ));
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {}
            }

            while let Some(finished) = clients.try_join_next() {
                if let Err(e) = finished {
                    error!("client task failed: {e}");
                }
            }
        }

        if !clients.is_empty() {
            info!("closing {} client(s)", clients.len());
        }
        // Receivers treat both a value change and a dropped sender as shutdown.
        let _ = shutdown_tx.send(true);
        while let Some(finished) = clients.join_next().await {
            if let Err(e) = finished {
                error!("client task failed: {e}");
            }
        }
    }
}

// ── Per-client task ───────────────────────────────────────────────────────────

/// Drives one connection until it closes; dropping `stream` on return closes
/// the socket.
async fn serve_client(
    stream: TcpStream,
    mut conn: Connection,
    options: DispatchOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_BUF_SIZE];

    await_request(&stream, &mut conn, &mut buf, options.request_window).await;

    let mut last_progress = Instant::now();
    while !conn.is_closed() {
        tokio::select! {
            ready = stream.ready(Interest::READABLE | Interest::WRITABLE) => {
                let ready = match ready {
                    Ok(ready) => ready,
                    Err(e) => {
                        warn!("connection {}: readiness error: {e}", conn.id());
                        conn.close(CloseReason::ReceiveFailed);
                        break;
                    }
                };
                if ready.is_readable() {
                    read_client(&stream, &mut conn, &mut buf);
                }
                if ready.is_writable()
                    && !conn.is_closed()
                    && conn.on_writable(&mut SocketSink(&stream)) == WriteOutcome::Progress
                {
                    last_progress = Instant::now();
                }
            }
            _ = sleep_until(last_progress + options.stall_timeout) => {
                conn.close(CloseReason::Stalled);
            }
            _ = shutdown.changed() => {
                conn.close(CloseReason::Shutdown);
            }
        }
    }
}

/// Gives the client up to `window` to finish its request headers before the
/// handshake goes out.  A request split over several segments is read until
/// its blank line, so a late `Icy-MetaData` header is still seen.
async fn await_request(stream: &TcpStream, conn: &mut Connection, buf: &mut [u8], window: Duration) {
    if window.is_zero() {
        return;
    }
    let deadline = Instant::now() + window;
    while !conn.request_complete() && !conn.is_closed() {
        match timeout_at(deadline, read_some(stream, buf)).await {
            Ok(Ok(n)) => conn.on_readable(&buf[..n]),
            Ok(Err(e)) => {
                debug!("connection {}: receive error: {e}", conn.id());
                conn.close(CloseReason::ReceiveFailed);
            }
            Err(_) => {
                debug!("connection {}: no complete request within {window:?}", conn.id());
                return;
            }
        }
    }
}

async fn read_some(stream: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        stream.readable().await?;
        match stream.try_read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

fn read_client(stream: &TcpStream, conn: &mut Connection, buf: &mut [u8]) {
    match stream.try_read(buf) {
        Ok(n) => conn.on_readable(&buf[..n]),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
        Err(e) => {
            debug!("connection {}: receive error: {e}", conn.id());
            conn.close(CloseReason::ReceiveFailed);
        }
    }
}

/// Non-blocking `Write` over a Tokio socket.
struct SocketSink<'a>(&'a TcpStream);

impl Write for SocketSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
