//! Resolved stream configuration.
//!
//! [`StreamConfig`] holds every server-wide value a connection needs: the
//! strings advertised in the ICY handshake and the buffer sizing constants.
//! It is built once at startup (the server crate resolves it from a TOML file
//! and CLI flags), wrapped in an `Arc`, and handed to the dispatcher and to
//! every connection.  Nothing in this crate reads files or environment
//! variables to obtain it.

use thiserror::Error;

/// Default chunk size and metadata interval: 32 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Default number of chunks read per buffer refill (1 MiB of read-ahead).
pub const DEFAULT_CHUNKS_PER_REFILL: usize = 32;

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamConfigError {
    #[error("metadata interval must be greater than zero")]
    ZeroMetaint,
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunks per refill must be greater than zero")]
    ZeroChunksPerRefill,
    #[error("one refill ({budget} bytes) must cover the refill threshold ({threshold} bytes)")]
    RefillBudgetTooSmall { budget: usize, threshold: usize },
}

/// Read-only, server-wide stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Host advertised in `icy-url`.
    pub public_host: String,
    /// Port advertised in `icy-url`.
    pub public_port: u16,
    /// `icy-name`.
    pub name: String,
    /// `icy-genre`.
    pub genre: String,
    /// `icy-notice1`.
    pub notice1: String,
    /// `icy-notice2`.
    pub notice2: String,
    /// Audio bytes between two metadata blocks (`icy-metaint`).
    pub metaint: usize,
    /// Unit of file read-ahead.
    pub chunk_size: usize,
    /// How many chunks one refill may append.
    pub chunks_per_refill: usize,
    /// `icy-br`, informational only.
    pub bitrate_kbps: u32,
    /// Consecutive unplayable tracks tolerated before a connection gives up.
    pub max_consecutive_failures: u32,
}

impl StreamConfig {
    /// Buffer level below which a connection refills: two intervals.
    pub fn min_buffered(&self) -> usize {
        self.metaint.saturating_mul(2)
    }

    /// Upper bound on bytes appended by one refill.
    pub fn refill_budget(&self) -> usize {
        self.chunk_size.saturating_mul(self.chunks_per_refill)
    }

    /// Checks the sizing constants.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamConfigError`] naming the first zero-valued size, or
    /// [`StreamConfigError::RefillBudgetTooSmall`] when one refill cannot
    /// bring the buffer back to [`min_buffered`](Self::min_buffered).
    pub fn validate(&self) -> Result<(), StreamConfigError> {
        if self.metaint == 0 {
            return Err(StreamConfigError::ZeroMetaint);
        }
        if self.chunk_size == 0 {
            return Err(StreamConfigError::ZeroChunkSize);
        }
        if self.chunks_per_refill == 0 {
            return Err(StreamConfigError::ZeroChunksPerRefill);
        }
        if self.refill_budget() < self.min_buffered() {
            return Err(StreamConfigError::RefillBudgetTooSmall {
                budget: self.refill_budget(),
                threshold: self.min_buffered(),
            });
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            public_host: "localhost".to_string(),
            public_port: 8888,
            name: "Shout mix".to_string(),
            genre: "Jazz Classical Rock".to_string(),
            notice1: "<BR>This stream requires".to_string(),
            notice2: "Winamp, or another streaming media player<BR>".to_string(),
            metaint: DEFAULT_CHUNK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks_per_refill: DEFAULT_CHUNKS_PER_REFILL,
            bitrate_kbps: 128,
            max_consecutive_failures: 8,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
