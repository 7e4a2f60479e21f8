//! Relay of the encoded pipe to the live streaming endpoint.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use opendj_core::{tools, Error, PipeReader, Publisher, Result};

use crate::process::{self, CopyError};

/// Publisher that remuxes the pipe with `ffmpeg -c copy` and pushes it to the
/// endpoint.
#[derive(Debug, Clone)]
pub struct FfmpegPublisher {
    ffmpeg_path: PathBuf,
    container: String,
}

impl FfmpegPublisher {
    /// Create a publisher producing FLV, as RTMP servers expect.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: tools::locate("ffmpeg"),
            container: "flv".to_string(),
        }
    }

    /// Use a specific ffmpeg binary.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Override the output container (e.g. `mpegts` for SRT or UDP endpoints).
    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    fn publish_args(&self, endpoint: &str) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-re".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            self.container.clone(),
            endpoint.to_string(),
        ]
    }

    /// Feed `source` into `program`'s stdin until end-of-stream or cancellation.
    async fn run_from_source(
        program: &Path,
        args: &[String],
        mut source: PipeReader,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("Running {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::TransportFailed(format!("Failed to spawn ffmpeg: {e}")))?;

        let stderr = process::forward_stderr(child.stderr.take(), "publisher");
        let Some(mut stdin) = child.stdin.take() else {
            process::stop(&mut child, "publisher").await;
            return Err(Error::Internal("Failed to capture ffmpeg stdin".to_string()));
        };

        let copied = tokio::select! {
            result = process::pump(&mut source, &mut stdin, cancel) => Some(result),
            () = cancel.cancelled() => None,
        };

        let Some(copied) = copied else {
            info!("Publisher cancelled after {} bytes", source.bytes_read());
            process::stop(&mut child, "publisher").await;
            return Ok(());
        };

        // Closing stdin lets ffmpeg flush and disconnect.
        drop(stdin);

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            () = cancel.cancelled() => None,
        };
        let Some(status) = status else {
            process::stop(&mut child, "publisher").await;
            return Ok(());
        };
        let summary = process::stderr_summary(stderr).await;

        match copied {
            Ok(bytes) if status.success() => {
                info!("Published {bytes} bytes");
                Ok(())
            }
            Ok(_) => Err(Error::TransportFailed(format!(
                "Failed to stream from pipe: ffmpeg {}",
                process::describe_exit(status, &summary)
            ))),
            Err(CopyError::Sink(e)) => Err(Error::TransportFailed(format!(
                "Connection to endpoint lost ({e}): ffmpeg {}",
                process::describe_exit(status, &summary)
            ))),
            Err(CopyError::Source(e)) => Err(Error::TransportFailed(format!(
                "Failed to read from pipe: {e}"
            ))),
        }
    }
}

impl Default for FfmpegPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for FfmpegPublisher {
    async fn publish(
        &self,
        source: PipeReader,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::TransportFailed(format!("Invalid endpoint {endpoint:?}: {e}")))?;
        info!("Publishing to {}://{}", url.scheme(), url.host_str().unwrap_or("localhost"));

        let args = self.publish_args(endpoint);
        let result = Self::run_from_source(&self.ffmpeg_path, &args, source, cancel).await;
        if let Err(e) = &result {
            error!("Publishing failed: {e}");
        }
        result
    }
}
