//! What is currently on air.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::queue::to_delta;
use super::QueueEntry;

/// The entry being streamed and when it started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NowPlaying {
    pub entry: QueueEntry,
    pub started_at: DateTime<Utc>,
}

impl NowPlaying {
    /// Time since the entry started.
    pub fn elapsed(&self) -> TimeDelta {
        Utc::now() - self.started_at
    }

    /// Time left until the entry is expected to end. Negative once it overruns.
    pub fn remaining(&self) -> TimeDelta {
        to_delta(self.entry.media.duration) - self.elapsed()
    }
}

/// Single slot holding the current entry.
///
/// Only the playback loop writes it; readers get a cloned snapshot, which may
/// be stale but is never partially updated.
#[derive(Debug, Default)]
pub struct PlaybackState {
    current: RwLock<Option<NowPlaying>>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of the current entry.
    pub fn current(&self) -> Option<NowPlaying> {
        self.current.read().clone()
    }

    /// Check if something is on air.
    pub fn is_playing(&self) -> bool {
        self.current.read().is_some()
    }

    /// Mark `entry` as on air, starting now.
    pub fn start(&self, entry: QueueEntry) {
        *self.current.write() = Some(NowPlaying {
            entry,
            started_at: Utc::now(),
        });
    }

    /// Reset the start time of the current entry to now.
    pub fn restart_clock(&self) {
        if let Some(now_playing) = self.current.write().as_mut() {
            now_playing.started_at = Utc::now();
        }
    }

    /// Mark nothing as playing.
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Time left of the current entry, zero when nothing is playing.
    pub fn remaining(&self) -> TimeDelta {
        self.current
            .read()
            .as_ref()
            .map_or_else(TimeDelta::zero, NowPlaying::remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaDescriptor;
    use std::time::Duration;

    fn make_entry(secs: u64) -> QueueEntry {
        QueueEntry::new(MediaDescriptor::new("t", "l", Duration::from_secs(secs)), "o")
    }

    #[test]
    fn test_playback_state_lifecycle() {
        let state = PlaybackState::new();
        assert!(state.current().is_none());
        assert_eq!(state.remaining(), TimeDelta::zero());

        state.start(make_entry(60));
        assert!(state.is_playing());
        let remaining = state.remaining();
        assert!(remaining <= TimeDelta::seconds(60));
        assert!(remaining > TimeDelta::seconds(55));

        state.clear();
        assert!(!state.is_playing());
    }

    #[test]
    fn test_remaining_goes_negative() {
        let now_playing = NowPlaying {
            entry: make_entry(10),
            started_at: Utc::now() - TimeDelta::seconds(30),
        };
        assert!(now_playing.remaining() < TimeDelta::seconds(-19));
        assert!(now_playing.elapsed() >= TimeDelta::seconds(30));
    }

    #[test]
    fn test_restart_clock() {
        let state = PlaybackState::new();
        state.restart_clock();
        assert!(state.current().is_none());

        state.start(make_entry(10));
        let before = state.current().unwrap().started_at;
        state.restart_clock();
        assert!(state.current().unwrap().started_at >= before);
    }
}
