//! Per-client streaming state machine.
//!
//! A [`Connection`] owns everything one listener needs: its song provider
//! cursor, the open [`AudioSource`], a read-ahead buffer, and the metadata
//! interval bookkeeping.  It performs no socket I/O of its own.  The
//! dispatcher calls [`Connection::on_readable`] with whatever bytes the
//! client sent and [`Connection::on_writable`] with a non-blocking sink.
//!
//! # States
//!
//! ```text
//! AwaitingHandshakeSend ──(ICY header fully sent)──▶ StreamingAudio ──▶ Closed
//!            │                                                         ▲
//!            └───────────────(disconnect / send error)─────────────────┘
//! ```
//!
//! # Byte accounting
//!
//! `bytes_until_metadata` starts at the configured interval and drops by the
//! number of audio bytes the sink *actually* accepted.  A short write simply
//! leaves the counter higher; the boundary is never overshot because a single
//! write never offers more than the bytes remaining before it.  Handshake and
//! metadata bytes travel through a separate control buffer that is always
//! drained before any further audio, so a partially written metadata block is
//! finished on the next callback.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::domain::config::StreamConfig;
use crate::protocol::{encode_metadata, requests_metadata, IcyResponse};
use crate::source::{AudioSource, ProviderError, SongProvider, TagReader};

/// Identifier used to correlate log lines of one listener.
pub type ConnectionId = Uuid;

/// Most request bytes kept while looking for `Icy-MetaData`.
pub const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its end of the socket.
    ClientDisconnected,
    /// Reading from the socket failed.
    ReceiveFailed,
    /// Writing to the socket failed.
    SendFailed,
    /// The socket accepted no bytes for too long.
    Stalled,
    /// The song provider has nothing more to play and the buffer is drained.
    SongsExhausted,
    /// Too many tracks in a row could not be opened or had no audio.
    TooManyTrackFailures,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::ClientDisconnected => "client disconnected",
            CloseReason::ReceiveFailed => "receive failed",
            CloseReason::SendFailed => "send failed",
            CloseReason::Stalled => "client stalled",
            CloseReason::SongsExhausted => "song source exhausted",
            CloseReason::TooManyTrackFailures => "too many unplayable tracks",
            CloseReason::Shutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingHandshakeSend,
    StreamingAudio,
    Closed(CloseReason),
}

/// Result of one writable callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// At least one byte reached the sink.
    Progress,
    /// The sink accepted nothing; wait for the next writable event.
    Blocked,
    /// The connection is closed; the socket should be dropped.
    Closed(CloseReason),
}

/// One listener's streaming state.
pub struct Connection {
    id: ConnectionId,
    config: Arc<StreamConfig>,
    provider: Box<dyn SongProvider>,
    tags: Arc<dyn TagReader>,
    state: ConnectionState,

    /// Request bytes received before the handshake was queued.
    request: Vec<u8>,
    handshake_queued: bool,
    wants_metadata: bool,

    /// Handshake or metadata bytes not yet accepted by the sink.
    control: Vec<u8>,
    control_sent: usize,

    /// Audio read-ahead; bytes before `head` have already been sent.
    buffer: Vec<u8>,
    head: usize,
    bytes_until_metadata: usize,

    source: Option<AudioSource>,
    title: String,
    track_bytes: u64,
    failed_tracks: u32,
    songs_exhausted: bool,

    audio_bytes_sent: u64,
    metadata_blocks_sent: u64,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        config: Arc<StreamConfig>,
        provider: Box<dyn SongProvider>,
        tags: Arc<dyn TagReader>,
    ) -> Self {
        let bytes_until_metadata = config.metaint;
        Self {
            id,
            config,
            provider,
            tags,
            state: ConnectionState::AwaitingHandshakeSend,
            request: Vec::new(),
            handshake_queued: false,
            wants_metadata: false,
            control: Vec::new(),
            control_sent: 0,
            buffer: Vec::new(),
            head: 0,
            bytes_until_metadata,
            source: None,
            title: String::new(),
            track_bytes: 0,
            failed_tracks: 0,
            songs_exhausted: false,
            audio_bytes_sent: 0,
            metadata_blocks_sent: 0,
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────────

    /// Handles bytes read from the client.
    ///
    /// An empty slice means the peer closed the socket.  Reads that arrive
    /// before the handshake is queued are collected (up to
    /// [`MAX_REQUEST_BYTES`]) and searched for `Icy-MetaData` as a whole, so
    /// a request split over several segments is still recognised.  Bytes
    /// arriving after that are discarded.
    pub fn on_readable(&mut self, data: &[u8]) {
        if self.is_closed() {
            return;
        }
        if data.is_empty() {
            self.close(CloseReason::ClientDisconnected);
            return;
        }
        if self.request_complete() {
            trace!("connection {}: discarding {} client bytes", self.id, data.len());
            return;
        }
        let room = MAX_REQUEST_BYTES - self.request.len();
        self.request.extend_from_slice(&data[..data.len().min(room)]);
        if !self.wants_metadata && requests_metadata(&self.request) {
            self.wants_metadata = true;
            debug!("connection {}: client wants metadata", self.id);
        }
    }

    /// `true` once nothing more the client sends can change the handshake:
    /// the request headers ended with a blank line, the size cap was hit, or
    /// the handshake is already queued.
    pub fn request_complete(&self) -> bool {
        self.handshake_queued
            || self.request.len() >= MAX_REQUEST_BYTES
            || self.request.windows(4).any(|w| w == b"\r\n\r\n")
            || self.request.windows(2).any(|w| w == b"\n\n")
    }

    /// Writes as much as the protocol state allows into `sink`.
    ///
    /// `sink` is expected to be non-blocking: `WouldBlock` and `Interrupted`
    /// count as "nothing sent".  Any other error, or `Ok(0)` for a non-empty
    /// write, closes the connection.
    pub fn on_writable<W: Write + ?Sized>(&mut self, sink: &mut W) -> WriteOutcome {
        let outcome = match self.state {
            ConnectionState::Closed(reason) => return WriteOutcome::Closed(reason),
            ConnectionState::AwaitingHandshakeSend => self.send_handshake(sink),
            ConnectionState::StreamingAudio => self.stream(sink),
        };
        match outcome {
            Ok(outcome) => outcome,
            Err(reason) => {
                self.close(reason);
                WriteOutcome::Closed(reason)
            }
        }
    }

    /// Ends the connection and releases the audio source.  Idempotent: only
    /// the first reason is kept.
    pub fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Closed(reason);
        self.source = None;
        self.buffer = Vec::new();
        self.head = 0;
        self.control = Vec::new();
        self.control_sent = 0;
        info!(
            "connection {} closed: {reason} ({} audio bytes, {} metadata blocks sent)",
            self.id, self.audio_bytes_sent, self.metadata_blocks_sent
        );
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed(_))
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            ConnectionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn wants_metadata(&self) -> bool {
        self.wants_metadata
    }

    /// Audio bytes buffered and not yet sent.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.head
    }

    pub fn bytes_until_metadata(&self) -> usize {
        self.bytes_until_metadata
    }

    /// Title of the track most recently opened.
    pub fn current_title(&self) -> &str {
        &self.title
    }

    /// Path of the open track, if any.
    pub fn current_track(&self) -> Option<&Path> {
        self.source.as_ref().map(AudioSource::path)
    }

    pub fn audio_bytes_sent(&self) -> u64 {
        self.audio_bytes_sent
    }

    pub fn metadata_blocks_sent(&self) -> u64 {
        self.metadata_blocks_sent
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    fn send_handshake<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<WriteOutcome, CloseReason> {
        if !self.handshake_queued {
            self.control = IcyResponse::from_config(&self.config).to_bytes();
            self.control_sent = 0;
            self.handshake_queued = true;
            self.request = Vec::new();
        }
        let written = self.flush_control(sink)?;
        if !self.control.is_empty() {
            return Ok(progress_if(written));
        }
        self.state = ConnectionState::StreamingAudio;
        debug!(
            "connection {}: handshake sent (metadata {})",
            self.id,
            if self.wants_metadata { "on" } else { "off" }
        );
        Ok(WriteOutcome::Progress)
    }

    // ── Audio ─────────────────────────────────────────────────────────────────

    fn stream<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<WriteOutcome, CloseReason> {
        let control_written = self.flush_control(sink)?;
        if !self.control.is_empty() {
            return Ok(progress_if(control_written));
        }

        if self.buffered() == 0 {
            if !self.songs_exhausted {
                self.refill()?;
            }
            if self.buffered() == 0 {
                // Only reachable once the provider is exhausted.
                return Err(CloseReason::SongsExhausted);
            }
        }

        let offer = self.buffered().min(self.bytes_until_metadata);
        let sent = write_nonblocking(sink, &self.buffer[self.head..self.head + offer])?;
        self.head += sent;
        self.bytes_until_metadata -= sent;
        self.audio_bytes_sent += sent as u64;

        if self.bytes_until_metadata == 0 {
            self.bytes_until_metadata = self.config.metaint;
            if self.wants_metadata {
                self.control = encode_metadata(&self.title);
                self.control_sent = 0;
                self.metadata_blocks_sent += 1;
                self.flush_control(sink)?;
            }
        }

        if self.buffered() < self.config.min_buffered() && !self.songs_exhausted {
            self.refill()?;
        }

        if self.songs_exhausted && self.buffered() == 0 && self.control.is_empty() {
            return Err(CloseReason::SongsExhausted);
        }
        Ok(progress_if(sent + control_written))
    }

    /// Appends up to one refill budget of audio (at least enough to reach
    /// the refill threshold), moving on to the next track whenever the
    /// current one is fully consumed.  Stops early when the provider is
    /// exhausted.
    fn refill(&mut self) -> Result<(), CloseReason> {
        if self.head > 0 {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
        // Never stop short of the refill threshold, whatever the budget.
        let target = (self.buffer.len() + self.config.refill_budget())
            .max(self.config.min_buffered());

        while self.buffer.len() < target {
            let Some(source) = self.source.as_mut() else {
                if !self.open_next_track()? {
                    break;
                }
                continue;
            };
            if source.is_exhausted() {
                self.finish_track()?;
                continue;
            }
            let want = (target - self.buffer.len()).min(self.config.chunk_size);
            match source.read_into(&mut self.buffer, want) {
                Ok(0) => self.finish_track()?,
                Ok(n) => self.track_bytes += n as u64,
                Err(e) => {
                    warn!(
                        "connection {}: read error on {}: {e}",
                        self.id,
                        source.path().display()
                    );
                    self.finish_track()?;
                }
            }
        }
        Ok(())
    }

    /// Asks the provider for the next track and opens it.
    ///
    /// Returns `Ok(false)` when the provider is exhausted, `Ok(true)` when the
    /// caller should keep reading (a track opened, or a failure was tolerated).
    fn open_next_track(&mut self) -> Result<bool, CloseReason> {
        match self.provider.next_track() {
            Ok(path) => match AudioSource::open(&path, self.tags.as_ref()) {
                Ok(source) => {
                    debug!(
                        "connection {}: now playing {} ({} bytes, title {:?})",
                        self.id,
                        path.display(),
                        source.size(),
                        source.title()
                    );
                    self.title = source.title().to_string();
                    self.track_bytes = 0;
                    self.source = Some(source);
                    Ok(true)
                }
                Err(e) => {
                    warn!("connection {}: skipping track: {e}", self.id);
                    self.note_track_failure()?;
                    Ok(true)
                }
            },
            Err(ProviderError::Exhausted) => {
                debug!("connection {}: no more tracks", self.id);
                self.songs_exhausted = true;
                Ok(false)
            }
            Err(e @ ProviderError::Unavailable(_)) => {
                warn!("connection {}: {e}", self.id);
                self.note_track_failure()?;
                Ok(true)
            }
        }
    }

    /// Releases the finished track's file handle.
    fn finish_track(&mut self) -> Result<(), CloseReason> {
        self.source = None;
        if self.track_bytes == 0 {
            self.note_track_failure()
        } else {
            self.failed_tracks = 0;
            Ok(())
        }
    }

    fn note_track_failure(&mut self) -> Result<(), CloseReason> {
        self.failed_tracks += 1;
        if self.failed_tracks >= self.config.max_consecutive_failures {
            warn!(
                "connection {}: {} consecutive tracks produced no audio",
                self.id, self.failed_tracks
            );
            return Err(CloseReason::TooManyTrackFailures);
        }
        Ok(())
    }

    // ── Control bytes ─────────────────────────────────────────────────────────

    fn flush_control<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<usize, CloseReason> {
        if self.control.is_empty() {
            return Ok(0);
        }
        let written = write_nonblocking(sink, &self.control[self.control_sent..])?;
        self.control_sent += written;
        if self.control_sent == self.control.len() {
            self.control.clear();
            self.control_sent = 0;
        }
        Ok(written)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("wants_metadata", &self.wants_metadata)
            .field("buffered", &self.buffered())
            .field("bytes_until_metadata", &self.bytes_until_metadata)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

fn progress_if(written: usize) -> WriteOutcome {
    if written > 0 {
        WriteOutcome::Progress
    } else {
        WriteOutcome::Blocked
    }
}

/// One non-blocking write attempt.
fn write_nonblocking<W: Write + ?Sized>(sink: &mut W, bytes: &[u8]) -> Result<usize, CloseReason> {
    if bytes.is_empty() {
        return Ok(0);
    }
    match sink.write(bytes) {
        Ok(0) => Err(CloseReason::SendFailed),
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(0)
        }
        Err(e) => {
            debug!("send error: {e}");
            Err(CloseReason::SendFailed)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
