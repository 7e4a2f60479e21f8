//! The public facade: queue, queries, handlers and session control.

use std::sync::Arc;

use chrono::TimeDelta;
use opendj_core::{
    Error, PlaybackState, Publisher, Queue, QueueEntry, Resolver, Result, Transcoder,
};
use parking_lot::Mutex;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PlaybackConfig;
use crate::handlers::Handlers;
use crate::session::{Session, SessionControl};

/// Stores the queue and handlers and drives playback sessions.
///
/// Queue operations and queries may be called from any task at any time,
/// including while [`Dj::play`] is running.
pub struct Dj {
    queue: Queue,
    playback: PlaybackState,
    handlers: Handlers,
    config: PlaybackConfig,
    resolver: Arc<dyn Resolver>,
    transcoder: Arc<dyn Transcoder>,
    publisher: Arc<dyn Publisher>,
    session: Mutex<Option<Arc<SessionControl>>>,
}

impl Dj {
    /// Create a DJ with an empty queue and default configuration.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            queue: Queue::new(),
            playback: PlaybackState::new(),
            handlers: Handlers::new(),
            config: PlaybackConfig::default(),
            resolver,
            transcoder,
            publisher,
            session: Mutex::new(None),
        }
    }

    /// Seed the queue, front first.
    #[must_use]
    pub fn with_queue(mut self, entries: Vec<QueueEntry>) -> Self {
        self.queue = Queue::with_entries(entries);
        self
    }

    /// Set the playback configuration.
    #[must_use]
    pub fn with_config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the playback configuration.
    pub const fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    // Handlers

    /// Register the function called every time a new song starts playing.
    pub fn on_new_song<F>(&self, handler: F)
    where
        F: Fn(&QueueEntry) + Send + Sync + 'static,
    {
        self.handlers.set_new_song(handler);
    }

    /// Register the function called every time a song stops playing.
    ///
    /// It gets the entry that finished and the error encountered while
    /// streaming it, if any. ffmpeg sometimes exits with an error even though
    /// the song was streamed completely, so the error is informational.
    pub fn on_end_of_song<F>(&self, handler: F)
    where
        F: Fn(&QueueEntry, Option<&Error>) + Send + Sync + 'static,
    {
        self.handlers.set_end_of_song(handler);
    }

    /// Register the function called once when a session ends with an error.
    pub fn on_playback_error<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.handlers.set_playback_error(handler);
    }

    // Queue

    /// Copy of the pending entries in playback order.
    pub fn queue(&self) -> Vec<QueueEntry> {
        self.queue.snapshot()
    }

    /// Number of pending entries.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Append an entry at the end of the queue.
    pub fn add_entry(&self, entry: QueueEntry) {
        self.queue.add(entry);
    }

    /// Insert an entry at `index`; an index past the end appends.
    pub fn insert_entry(&self, entry: QueueEntry, index: isize) -> Result<()> {
        self.queue.insert(entry, index)
    }

    /// Remove the entry at `index`.
    pub fn remove_entry(&self, index: isize) -> Result<QueueEntry> {
        self.queue.remove_at(index)
    }

    /// Swap the entry at `index` for `entry`.
    pub fn replace_entry(&self, entry: QueueEntry, index: isize) -> Result<QueueEntry> {
        self.queue.replace_at(entry, index)
    }

    /// Set or clear the dedication of the entry at `index`.
    pub fn set_dedication(&self, index: isize, dedication: Option<String>) -> Result<()> {
        self.queue.set_dedication(index, dedication)
    }

    /// Get the entry at `index`.
    pub fn entry_at(&self, index: isize) -> Result<QueueEntry> {
        self.queue.entry_at(index)
    }

    // Queries

    /// The entry on air and how long it has been playing.
    pub fn currently_playing(&self) -> Result<(QueueEntry, TimeDelta)> {
        let now_playing = self.playback.current().ok_or(Error::NothingPlaying)?;
        let elapsed = now_playing.elapsed();
        Ok((now_playing.entry, elapsed))
    }

    /// Queue positions of all entries submitted by `owner`.
    pub fn user_positions(&self, owner: &str) -> Vec<usize> {
        self.queue.positions_of(owner)
    }

    /// Estimated time until each of `owner`'s entries starts playing.
    pub fn duration_until(&self, owner: &str) -> Vec<TimeDelta> {
        self.queue
            .cumulative_wait_for(owner, self.playback.remaining())
    }

    // Session control

    /// Check if a session is running.
    pub fn is_playing(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Stream the queue to `endpoint` until it stays empty, fails or is stopped.
    ///
    /// Resolves when the session is over, so callers usually spawn it. When
    /// the queue is empty, silence is streamed for a bounded number of
    /// segments before the session ends. A session error is passed to the
    /// playback-error handler and returned.
    pub async fn play(&self, endpoint: &str) -> Result<()> {
        let control = {
            let mut slot = self.session.lock();
            if slot.is_some() {
                return Err(Error::AlreadyPlaying);
            }
            let control = Arc::new(SessionControl::new());
            *slot = Some(control.clone());
            control
        };
        let active = ActiveSession {
            slot: &self.session,
            playback: &self.playback,
        };

        let session = Session {
            config: &self.config,
            queue: &self.queue,
            playback: &self.playback,
            handlers: &self.handlers,
            resolver: self.resolver.as_ref(),
            transcoder: self.transcoder.as_ref(),
            publisher: self.publisher.as_ref(),
            control: &control,
        };

        let id = Uuid::new_v4();
        info!(session = %id, "Starting playback with {} queued entries", self.queue.len());
        let result = session
            .run(endpoint)
            .instrument(info_span!("session", id = %id))
            .await;
        drop(active);

        match &result {
            Ok(()) => info!(session = %id, "Playback finished"),
            Err(e) => {
                error!(session = %id, "Playback failed: {e}");
                self.handlers.playback_error(e);
            }
        }
        result
    }

    /// Ask the running session to stop. Returns false if none is running.
    pub fn stop(&self) -> bool {
        let slot = self.session.lock();
        let Some(control) = slot.as_ref() else {
            return false;
        };
        info!("Stop requested");
        control.stop();
        true
    }

    /// Abort the current entry (or silence segment) and continue with the
    /// next one. Returns false if no session is running.
    pub fn skip(&self) -> bool {
        let slot = self.session.lock();
        let Some(control) = slot.as_ref() else {
            return false;
        };
        info!("Skip requested");
        control.skip();
        true
    }
}

/// Releases the session slot on every exit path of [`Dj::play`].
struct ActiveSession<'a> {
    slot: &'a Mutex<Option<Arc<SessionControl>>>,
    playback: &'a PlaybackState,
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        if let Some(control) = self.slot.lock().take() {
            control.stop();
        }
        self.playback.clear();
    }
}
