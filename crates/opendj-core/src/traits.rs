//! Collaborator capabilities the playback loops depend on.
//!
//! The production implementations shell out to yt-dlp and ffmpeg; tests plug
//! in fakes that produce synthetic streams.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::pipe::{PipeReader, PipeWriter};
use crate::Result;

/// Turns a request locator into a directly streamable source.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `locator` to a stream locator.
    ///
    /// Fails with [`crate::Error::ResolutionFailed`] when the media cannot be
    /// found or is restricted.
    async fn resolve(&self, locator: &str) -> Result<String>;
}

/// Turns a streamable source, or a request for silence, into encoded audio.
///
/// Both operations append to `sink` and return once their output is complete.
/// When `cancel` fires they stop early, release their resources and return
/// `Ok(())`. A broken `sink` is reported as [`crate::Error::TransportFailed`];
/// any other failure as [`crate::Error::EncodeFailed`].
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Encode the source at `stream_locator` followed by `padding` of silence.
    async fn encode(
        &self,
        stream_locator: &str,
        padding: Duration,
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Encode `duration` of silence.
    async fn silence(
        &self,
        duration: Duration,
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Relays the encoded stream to the live endpoint.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Forward everything from `source` to `endpoint` until end-of-stream or
    /// until `cancel` fires.
    ///
    /// Fails with [`crate::Error::TransportFailed`] when the endpoint cannot
    /// be reached or the connection drops.
    async fn publish(
        &self,
        source: PipeReader,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
