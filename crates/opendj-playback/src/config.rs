//! Playback timing and buffering configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::time::Duration;

use opendj_core::pipe::DEFAULT_PIPE_CAPACITY;
use opendj_core::Result;
use serde::{Deserialize, Serialize};

/// Length of one gap-filling silence segment.
pub const DEFAULT_SILENCE_SEGMENT_SECS: u64 = 15;
/// Consecutive silence segments written before an idle session ends.
pub const DEFAULT_MAX_EMPTY_STREAK: u32 = 4;
/// Silence appended to each entry to hide the startup latency of the next.
pub const DEFAULT_TRACK_PADDING_SECS: u64 = 5;
/// Delay before the publisher connects, so the pipe already holds data.
pub const DEFAULT_PUBLISHER_WARMUP_SECS: u64 = 5;

/// Tunables for a playback session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub silence_segment_secs: u64,
    pub max_empty_streak: u32,
    pub track_padding_secs: u64,
    pub publisher_warmup_secs: u64,
    /// Pipe buffer size in bytes.
    pub pipe_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            silence_segment_secs: DEFAULT_SILENCE_SEGMENT_SECS,
            max_empty_streak: DEFAULT_MAX_EMPTY_STREAK,
            track_padding_secs: DEFAULT_TRACK_PADDING_SECS,
            publisher_warmup_secs: DEFAULT_PUBLISHER_WARMUP_SECS,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl PlaybackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub const fn silence_segment(&self) -> Duration {
        Duration::from_secs(self.silence_segment_secs)
    }

    pub const fn track_padding(&self) -> Duration {
        Duration::from_secs(self.track_padding_secs)
    }

    pub const fn publisher_warmup(&self) -> Duration {
        Duration::from_secs(self.publisher_warmup_secs)
    }

    #[must_use]
    pub const fn with_silence_segment_secs(mut self, secs: u64) -> Self {
        self.silence_segment_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_max_empty_streak(mut self, streak: u32) -> Self {
        self.max_empty_streak = streak;
        self
    }

    #[must_use]
    pub const fn with_track_padding_secs(mut self, secs: u64) -> Self {
        self.track_padding_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_publisher_warmup_secs(mut self, secs: u64) -> Self {
        self.publisher_warmup_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_pipe_capacity(mut self, bytes: usize) -> Self {
        self.pipe_capacity = bytes;
        self
    }
}
