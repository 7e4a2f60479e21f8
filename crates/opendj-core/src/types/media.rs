//! Media and queue entry types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A video or song that can be streamed.
///
/// The locator can be anything the configured resolver understands
/// (for yt-dlp, any supported page URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MediaDescriptor {
    /// Human readable title.
    pub title: String,
    /// Opaque resolvable reference, usually a page URL.
    pub locator: String,
    /// Expected playback length.
    pub duration: Duration,
}

impl MediaDescriptor {
    pub fn new(title: impl Into<String>, locator: impl Into<String>, duration: Duration) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            duration,
        }
    }

    /// Format the duration as MM:SS or HH:MM:SS.
    pub fn duration_display(&self) -> String {
        let total_secs = self.duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

/// Media plus the metadata of whoever requested it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    /// The media to play.
    pub media: MediaDescriptor,
    /// Identity of the submitter.
    pub owner: String,
    /// Optional dedication shown alongside the entry.
    #[serde(default)]
    pub dedication: Option<String>,
}

impl QueueEntry {
    pub fn new(media: MediaDescriptor, owner: impl Into<String>) -> Self {
        Self {
            media,
            owner: owner.into(),
            dedication: None,
        }
    }

    #[must_use]
    pub fn with_dedication(mut self, dedication: impl Into<String>) -> Self {
        self.dedication = Some(dedication.into());
        self
    }

    /// Check whether this entry was submitted by `owner`.
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}
