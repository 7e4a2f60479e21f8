//! Single-slot notification handlers.

use std::fmt;
use std::sync::Arc;

use opendj_core::{Error, QueueEntry};
use parking_lot::RwLock;

/// Called when an entry is about to start streaming.
pub type NewSongHandler = Arc<dyn Fn(&QueueEntry) + Send + Sync>;
/// Called when an entry finished, with the per-entry error if there was one.
pub type EndOfSongHandler = Arc<dyn Fn(&QueueEntry, Option<&Error>) + Send + Sync>;
/// Called once when a session ends with an error.
pub type PlaybackErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Registry with one slot per event; the last registration wins.
///
/// Handlers run synchronously on the playback loop, so a handler that blocks
/// stalls the live stream. Each slot is cloned out of its lock before the
/// call, which lets a handler use the [`crate::Dj`] freely, including
/// registering new handlers. A registration made while a session runs takes
/// effect from the next event.
#[derive(Default)]
pub struct Handlers {
    new_song: RwLock<Option<NewSongHandler>>,
    end_of_song: RwLock<Option<EndOfSongHandler>>,
    playback_error: RwLock<Option<PlaybackErrorHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_new_song<F>(&self, handler: F)
    where
        F: Fn(&QueueEntry) + Send + Sync + 'static,
    {
        *self.new_song.write() = Some(Arc::new(handler));
    }

    pub fn set_end_of_song<F>(&self, handler: F)
    where
        F: Fn(&QueueEntry, Option<&Error>) + Send + Sync + 'static,
    {
        *self.end_of_song.write() = Some(Arc::new(handler));
    }

    pub fn set_playback_error<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.playback_error.write() = Some(Arc::new(handler));
    }

    pub(crate) fn new_song(&self, entry: &QueueEntry) {
        let handler = self.new_song.read().clone();
        if let Some(handler) = handler {
            handler(entry);
        }
    }

    pub(crate) fn end_of_song(&self, entry: &QueueEntry, error: Option<&Error>) {
        let handler = self.end_of_song.read().clone();
        if let Some(handler) = handler {
            handler(entry, error);
        }
    }

    pub(crate) fn playback_error(&self, error: &Error) {
        let handler = self.playback_error.read().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("new_song", &self.new_song.read().is_some())
            .field("end_of_song", &self.end_of_song.read().is_some())
            .field("playback_error", &self.playback_error.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendj_core::MediaDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_entry() -> QueueEntry {
        QueueEntry::new(MediaDescriptor::new("t", "l", Duration::from_secs(1)), "o")
    }

    #[test]
    fn test_missing_handlers_are_noops() {
        let handlers = Handlers::new();
        handlers.new_song(&make_entry());
        handlers.end_of_song(&make_entry(), None);
        handlers.playback_error(&Error::Cancelled);
    }

    #[test]
    fn test_last_registration_wins() {
        let handlers = Handlers::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        handlers.set_new_song(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        handlers.set_new_song(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handlers.new_song(&make_entry());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_of_song_receives_error() {
        let handlers = Handlers::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = seen.clone();
        handlers.set_end_of_song(move |entry, error| {
            log.lock().push((entry.media.title.clone(), error.map(ToString::to_string)));
        });

        handlers.end_of_song(&make_entry(), None);
        handlers.end_of_song(&make_entry(), Some(&Error::EncodeFailed {
            code: Some(1),
            message: "boom".into(),
        }));

        let seen = seen.lock();
        assert_eq!(seen[0], ("t".to_string(), None));
        assert_eq!(seen[1].1.as_deref(), Some("Encoder exited with exit code 1: boom"));
    }

    #[test]
    fn test_handler_may_reregister() {
        let handlers = Arc::new(Handlers::new());
        let registry = handlers.clone();
        handlers.set_playback_error(move |_| {
            registry.set_playback_error(|_| {});
        });
        handlers.playback_error(&Error::Cancelled);
        assert!(format!("{handlers:?}").contains("playback_error: true"));
    }
}
