//! Core domain types for `OpenDJ`.

pub mod media;
pub mod playback;
pub mod queue;

pub use media::{MediaDescriptor, QueueEntry};
pub use playback::{NowPlaying, PlaybackState};
pub use queue::Queue;
