//! Subprocess plumbing shared by the transcoder and the publisher.

use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Chunk size for relaying bytes between processes and the pipe.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Which side of a [`pump`] failed.
#[derive(Debug)]
pub(crate) enum CopyError {
    Source(std::io::Error),
    Sink(std::io::Error),
}

/// Copy `source` into `sink` until end-of-stream or `cancel`, flushing at
/// the end.
///
/// Cancellation is only observed between chunks: a chunk that was read is
/// always written whole, so the sink never ends on a torn write.
pub(crate) async fn pump<R, W>(
    source: &mut R,
    sink: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;
    let mut last_logged = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            n = source.read(&mut buffer) => n.map_err(CopyError::Source)?,
        };
        if n == 0 {
            break;
        }
        sink.write_all(&buffer[..n]).await.map_err(CopyError::Sink)?;
        total += n as u64;

        if total >= last_logged + 1024 * 1024 {
            last_logged = total;
            debug!("Relayed {} KB so far", total / 1024);
        }
    }

    sink.flush().await.map_err(CopyError::Sink)?;
    Ok(total)
}

/// Forward a child's stderr to the log, returning its last non-empty line.
///
/// Draining stderr also keeps a chatty ffmpeg from blocking on a full pipe.
pub(crate) fn forward_stderr(stderr: Option<ChildStderr>, label: &'static str) -> JoinHandle<String> {
    tokio::spawn(async move {
        let Some(stderr) = stderr else {
            return String::new();
        };

        let mut lines = BufReader::new(stderr).lines();
        let mut last = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("{label}: {line}");
            last = line.to_string();
        }
        last
    })
}

/// Collect the stderr summary, tolerating a panicked forwarder.
pub(crate) async fn stderr_summary(handle: JoinHandle<String>) -> String {
    handle.await.unwrap_or_default()
}

/// Kill and reap `child`.
pub(crate) async fn stop(child: &mut Child, label: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {label}: {e}");
    }
}

/// Render a stderr summary with the exit status for error messages.
pub(crate) fn describe_exit(status: ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {stderr}")
    }
}
