//! Song providers: where the next track comes from.
//!
//! A [`SongProvider`] is a connection-scoped cursor that yields file paths.
//! A [`SongCatalog`] is the shared, read-only description of a song source;
//! every connection asks it for a fresh provider so two listeners never
//! advance each other's position.
//!
//! What happens when a provider runs out of songs is an explicit
//! [`ExhaustionPolicy`] rather than an implicit restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Why a provider could not produce another track.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No more tracks, and the policy says not to start over.
    #[error("song source exhausted")]
    Exhausted,
    /// The backing store could not be read at all.
    #[error("song source unavailable: {0}")]
    Unavailable(String),
}

/// What a provider does after yielding its last track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Start again from the first track.
    #[default]
    Restart,
    /// Report [`ProviderError::Exhausted`] from then on.
    Stop,
}

/// Connection-scoped source of track paths.
#[cfg_attr(test, mockall::automock)]
pub trait SongProvider: Send {
    /// Returns the path of the next track to play.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Exhausted`] when there is nothing left to play, or
    /// [`ProviderError::Unavailable`] when the source cannot be read.
    fn next_track(&mut self) -> Result<PathBuf, ProviderError>;
}

/// Shared description of a song source that hands out independent cursors.
pub trait SongCatalog: Send + Sync {
    /// Creates a provider positioned at the start of the source.
    fn open_provider(&self) -> Box<dyn SongProvider>;
}

// ── Playlist ──────────────────────────────────────────────────────────────────

/// Yields a fixed list of paths in order.
///
/// A one-entry playlist with [`ExhaustionPolicy::Restart`] plays the same
/// file forever.
#[derive(Debug, Clone)]
pub struct PlaylistProvider {
    tracks: Arc<[PathBuf]>,
    position: usize,
    policy: ExhaustionPolicy,
    finished: bool,
}

impl PlaylistProvider {
    pub fn new(tracks: impl Into<Arc<[PathBuf]>>, policy: ExhaustionPolicy) -> Self {
        Self {
            tracks: tracks.into(),
            position: 0,
            policy,
            finished: false,
        }
    }
}

impl SongProvider for PlaylistProvider {
    fn next_track(&mut self) -> Result<PathBuf, ProviderError> {
        if self.finished || self.tracks.is_empty() {
            return Err(ProviderError::Exhausted);
        }
        if self.position == self.tracks.len() {
            match self.policy {
                ExhaustionPolicy::Restart => self.position = 0,
                ExhaustionPolicy::Stop => {
                    self.finished = true;
                    return Err(ProviderError::Exhausted);
                }
            }
        }
        let track = self.tracks[self.position].clone();
        self.position += 1;
        Ok(track)
    }
}

// ── Directory walk ────────────────────────────────────────────────────────────

/// Walks a directory tree and yields matching files in sorted order.
///
/// The walk happens on the first request and again after every full pass
/// when the policy is [`ExhaustionPolicy::Restart`], so files added while the
/// server runs are picked up on the next pass.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    extensions: Arc<[String]>,
    policy: ExhaustionPolicy,
    queue: Vec<PathBuf>,
    position: usize,
    passes: u32,
}

impl DirectoryProvider {
    /// `extensions` are matched case-insensitively without the dot; an empty
    /// list accepts every file.
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: impl Into<Arc<[String]>>,
        policy: ExhaustionPolicy,
    ) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.into(),
            policy,
            queue: Vec::new(),
            position: 0,
            passes: 0,
        }
    }

    fn rescan(&mut self) -> Result<(), ProviderError> {
        if !self.root.is_dir() {
            return Err(ProviderError::Unavailable(format!(
                "{} is not a readable directory",
                self.root.display()
            )));
        }
        let mut found: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.accepts(path))
            .collect();
        found.sort();

        debug!(
            "scanned {}: {} track(s) on pass {}",
            self.root.display(),
            found.len(),
            self.passes + 1
        );
        self.queue = found;
        self.position = 0;
        self.passes += 1;
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl SongProvider for DirectoryProvider {
    fn next_track(&mut self) -> Result<PathBuf, ProviderError> {
        if self.position == self.queue.len() {
            let may_scan = self.passes == 0 || self.policy == ExhaustionPolicy::Restart;
            if !may_scan {
                return Err(ProviderError::Exhausted);
            }
            self.rescan()?;
            if self.queue.is_empty() {
                return Err(ProviderError::Exhausted);
            }
        }
        let track = self.queue[self.position].clone();
        self.position += 1;
        Ok(track)
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// The song sources the server knows how to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongSource {
    Playlist {
        tracks: Vec<PathBuf>,
        policy: ExhaustionPolicy,
    },
    Directory {
        root: PathBuf,
        extensions: Vec<String>,
        policy: ExhaustionPolicy,
    },
}

impl SongCatalog for SongSource {
    fn open_provider(&self) -> Box<dyn SongProvider> {
        match self {
            SongSource::Playlist { tracks, policy } => {
                Box::new(PlaylistProvider::new(tracks.clone(), *policy))
            }
            SongSource::Directory {
                root,
                extensions,
                policy,
            } => Box::new(DirectoryProvider::new(
                root.clone(),
                extensions.clone(),
                *policy,
            )),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
