//! Fake collaborators producing synthetic streams with controllable failures.
//!
//! Locator conventions understood by the fakes:
//! - `fail:*` cannot be resolved
//! - `slow:*` takes far longer to resolve than any test waits
//! - `hang:*` streams until skipped or stopped
//! - `broken:*` makes the encoder exit with a non-zero code
//! - anything else encodes instantly to `<stream:locator>`

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opendj_core::{
    Error, MediaDescriptor, PipeReader, PipeWriter, Publisher, QueueEntry, Resolver, Result,
    Transcoder,
};
use opendj_playback::{Dj, PlaybackConfig};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const ENDPOINT: &str = "rtmp://localhost:1935/live/test-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewSong(String),
    EndOfSong(String, Option<String>),
    PlaybackError(String),
}

#[derive(Default)]
pub struct FakeResolver {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, locator: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if locator.starts_with("fail:") {
            return Err(Error::ResolutionFailed(format!("{locator} is unavailable")));
        }
        if locator.starts_with("slow:") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(format!("stream:{locator}"))
    }
}

#[derive(Default)]
pub struct FakeTranscoder {
    pub silences: AtomicUsize,
}

async fn write(sink: &mut PipeWriter, bytes: &[u8]) -> Result<()> {
    sink.write_all(bytes)
        .await
        .map_err(|e| Error::TransportFailed(format!("Failed to write to pipe: {e}")))
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn encode(
        &self,
        stream_locator: &str,
        _padding: Duration,
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if stream_locator.contains("hang:") {
            write(sink, format!("<{stream_locator}").as_bytes()).await?;
            cancel.cancelled().await;
            return Ok(());
        }
        if stream_locator.contains("broken:") {
            return Err(Error::EncodeFailed {
                code: Some(1),
                message: "Conversion failed!".to_string(),
            });
        }
        write(sink, format!("<{stream_locator}>").as_bytes()).await
    }

    async fn silence(
        &self,
        _duration: Duration,
        sink: &mut PipeWriter,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.silences.fetch_add(1, Ordering::SeqCst);
        write(sink, b".").await
    }
}

/// Collects everything relayed, or rejects the connection.
#[derive(Default)]
pub struct FakePublisher {
    pub received: Mutex<Vec<u8>>,
    pub reject: bool,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        mut source: PipeReader,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.reject {
            return Err(Error::TransportFailed(format!("{endpoint} refused the connection")));
        }

        let mut buffer = [0u8; 256];
        loop {
            let n = tokio::select! {
                n = source.read(&mut buffer) => n.map_err(|e| Error::TransportFailed(e.to_string()))?,
                () = cancel.cancelled() => return Ok(()),
            };
            if n == 0 {
                return Ok(());
            }
            self.received.lock().extend_from_slice(&buffer[..n]);
        }
    }
}

impl FakePublisher {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn received_text(&self) -> String {
        String::from_utf8_lossy(&self.received.lock()).into_owned()
    }
}

pub struct Harness {
    pub dj: Arc<Dj>,
    pub resolver: Arc<FakeResolver>,
    pub transcoder: Arc<FakeTranscoder>,
    pub publisher: Arc<FakePublisher>,
    pub events: Arc<Mutex<Vec<Event>>>,
    pub started: mpsc::UnboundedReceiver<String>,
}

pub fn entry(locator: &str, owner: &str, secs: u64) -> QueueEntry {
    QueueEntry::new(
        MediaDescriptor::new(locator, locator, Duration::from_secs(secs)),
        owner,
    )
}

pub fn test_config() -> PlaybackConfig {
    PlaybackConfig::new()
        .with_publisher_warmup_secs(0)
        .with_track_padding_secs(0)
        .with_max_empty_streak(4)
        .with_pipe_capacity(4096)
}

pub fn harness(entries: Vec<QueueEntry>) -> Harness {
    harness_with(entries, FakePublisher::default())
}

pub fn harness_with(entries: Vec<QueueEntry>, publisher: FakePublisher) -> Harness {
    let resolver = Arc::new(FakeResolver::default());
    let transcoder = Arc::new(FakeTranscoder::default());
    let publisher = Arc::new(publisher);

    let dj = Dj::new(resolver.clone(), transcoder.clone(), publisher.clone())
        .with_config(test_config())
        .with_queue(entries);

    let events = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started) = mpsc::unbounded_channel();

    let log = events.clone();
    dj.on_new_song(move |entry| {
        log.lock().push(Event::NewSong(entry.media.title.clone()));
        let _ = started_tx.send(entry.media.title.clone());
    });

    let log = events.clone();
    dj.on_end_of_song(move |entry, error| {
        log.lock().push(Event::EndOfSong(
            entry.media.title.clone(),
            error.map(ToString::to_string),
        ));
    });

    let log = events.clone();
    dj.on_playback_error(move |error| {
        log.lock().push(Event::PlaybackError(error.to_string()));
    });

    Harness {
        dj: Arc::new(dj),
        resolver,
        transcoder,
        publisher,
        events,
        started,
    }
}

impl Harness {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Wait until the new-song handler fired for `title`.
    pub async fn wait_started(&mut self, title: &str) {
        let started = tokio::time::timeout(Duration::from_secs(5), self.started.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(started, title);
    }

    /// Wait until `title` is on air, before its new-song handler fires.
    pub async fn wait_resolving(&self, title: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok((entry, _)) = self.dj.currently_playing() {
                    if entry.media.title == title {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    pub fn spawn_play(&self) -> tokio::task::JoinHandle<Result<()>> {
        let dj = self.dj.clone();
        tokio::spawn(async move { dj.play(ENDPOINT).await })
    }
}

pub async fn join(handle: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
}
