//! Producer and consumer loops of a single playback session.

use std::sync::atomic::{AtomicBool, Ordering};

use opendj_core::{
    byte_pipe, Error, PipeReader, PipeWriter, PlaybackState, Publisher, Queue, QueueEntry,
    Resolver, Result, Transcoder,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::handlers::Handlers;

/// Stop and skip signals for a running session.
#[derive(Debug, Default)]
pub(crate) struct SessionControl {
    /// Cancelled on stop and when either loop fails.
    cancel: CancellationToken,
    /// Set only when the caller asked to stop.
    stop_requested: AtomicBool,
    /// Token of the segment currently being written; cancelled by skip.
    segment: Mutex<CancellationToken>,
}

impl SessionControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub(crate) fn skip(&self) {
        self.segment.lock().cancel();
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Install and return a fresh token for the next segment.
    fn next_segment(&self) -> CancellationToken {
        let token = self.cancel.child_token();
        *self.segment.lock() = token.clone();
        token
    }
}

/// Everything one session needs, borrowed from the owning `Dj`.
pub(crate) struct Session<'a> {
    pub(crate) config: &'a PlaybackConfig,
    pub(crate) queue: &'a Queue,
    pub(crate) playback: &'a PlaybackState,
    pub(crate) handlers: &'a Handlers,
    pub(crate) resolver: &'a dyn Resolver,
    pub(crate) transcoder: &'a dyn Transcoder,
    pub(crate) publisher: &'a dyn Publisher,
    pub(crate) control: &'a SessionControl,
}

impl Session<'_> {
    /// Run producer and consumer until both have finished.
    pub(crate) async fn run(&self, endpoint: &str) -> Result<()> {
        let (writer, reader) = byte_pipe(self.config.pipe_capacity);

        let producer = async {
            let result = self.produce(writer).await;
            if let Err(e) = &result {
                error!("Playback loop failed: {e}");
                self.control.cancel.cancel();
            }
            result
        };

        let consumer = async {
            let result = self.consume(reader, endpoint).await;
            if let Err(e) = &result {
                error!("Publisher failed: {e}");
                self.control.cancel.cancel();
            }
            result
        };

        let (produced, consumed) = tokio::join!(producer, consumer);

        if self.control.stop_requested() {
            if let Err(e) = produced.and(consumed) {
                debug!("Ignoring error after stop request: {e}");
            }
            return Ok(());
        }

        match (produced, consumed) {
            (Ok(()), Ok(())) => Ok(()),
            // The producer's broken pipe is only a symptom of the publisher failing.
            (Err(Error::TransportFailed(_)), Err(e)) | (Ok(()), Err(e)) | (Err(e), _) => Err(e),
        }
    }

    /// Drain the queue into `sink` until it stays empty, breaks or is stopped.
    async fn produce(&self, mut sink: PipeWriter) -> Result<()> {
        let mut empty_streak = 0u32;

        let result = loop {
            if self.control.is_cancelled() {
                info!("Playback loop stopped");
                break Ok(());
            }

            let entry = match self.queue.pop_front() {
                Ok(entry) => entry,
                Err(Error::EmptyQueue) => {
                    self.playback.clear();
                    if empty_streak >= self.config.max_empty_streak {
                        info!("Queue stayed empty for {empty_streak} silence segments, ending playback");
                        break Ok(());
                    }
                    empty_streak += 1;

                    if let Err(e) = self.fill_gap(&mut sink).await {
                        break Err(e);
                    }
                    continue;
                }
                Err(e) => break Err(e),
            };

            empty_streak = 0;
            if let Err(e) = self.play_entry(entry, &mut sink).await {
                break Err(e);
            }
        };

        self.playback.clear();
        debug!("Playback loop wrote {} bytes", sink.bytes_written());
        result
    }

    async fn fill_gap(&self, sink: &mut PipeWriter) -> Result<()> {
        let segment = self.control.next_segment();
        debug!("Queue empty, writing silence");

        match self
            .transcoder
            .silence(self.config.silence_segment(), sink, &segment)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Silence segment failed: {e}");
                Ok(())
            }
        }
    }

    async fn play_entry(&self, entry: QueueEntry, sink: &mut PipeWriter) -> Result<()> {
        let segment = self.control.next_segment();
        self.playback.start(entry.clone());
        info!(
            owner = %entry.owner,
            "Resolving {} ({})",
            entry.media.title,
            entry.media.locator
        );

        let resolved = tokio::select! {
            resolved = self.resolver.resolve(&entry.media.locator) => Some(resolved),
            () = segment.cancelled() => None,
        };
        let Some(resolved) = resolved else {
            self.playback.clear();
            if self.control.is_cancelled() {
                info!("Stopped before {} started, keeping it queued", entry.media.title);
                self.queue.push_front(entry);
            } else {
                info!("Skipped {} before it started", entry.media.title);
                self.handlers.end_of_song(&entry, None);
            }
            return Ok(());
        };
        let stream_locator = resolved?;

        self.handlers.new_song(&entry);
        self.playback.restart_clock();
        info!(owner = %entry.owner, "Now playing {}", entry.media.title);

        let outcome = self
            .transcoder
            .encode(&stream_locator, self.config.track_padding(), sink, &segment)
            .await;

        if segment.is_cancelled() && outcome.is_ok() {
            info!("Stopped {} early", entry.media.title);
        }

        match outcome {
            Ok(()) => {
                self.handlers.end_of_song(&entry, None);
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.handlers.end_of_song(&entry, Some(&e));
                Err(e)
            }
            Err(e) => {
                warn!("Playback of {} ended with an error: {e}", entry.media.title);
                self.handlers.end_of_song(&entry, Some(&e));
                Ok(())
            }
        }
    }

    /// Relay the pipe to `endpoint` after the warm-up delay.
    async fn consume(&self, source: PipeReader, endpoint: &str) -> Result<()> {
        let warmup = self.config.publisher_warmup();
        if !warmup.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(warmup) => {}
                () = self.control.cancel.cancelled() => return Ok(()),
            }
        }

        info!("Starting publisher");
        self.publisher
            .publish(source, endpoint, &self.control.cancel)
            .await
    }
}
