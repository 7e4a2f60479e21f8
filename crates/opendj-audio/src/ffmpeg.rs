//! FFmpeg-based transcoding of resolved streams and silence into the pipe.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opendj_core::{tools, Error, PipeWriter, Result, Transcoder};

use crate::process::{self, CopyError};

/// Output encoding applied to everything written into the pipe.
///
/// Every segment uses the same parameters so the publisher can relay the
/// concatenated MPEG-TS stream without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Audio codec passed to `-c:a`.
    pub codec: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bitrate passed to `-b:a`.
    pub bitrate: String,
    /// Number of output channels.
    pub channels: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            sample_rate: 44100,
            bitrate: "160k".to_string(),
            channels: 2,
        }
    }
}

impl EncoderSettings {
    fn output_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.codec.clone(),
            "-strict".to_string(),
            "-2".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-f".to_string(),
            "mpegts".to_string(),
            "pipe:1".to_string(),
        ]
    }

    fn channel_layout(&self) -> &'static str {
        if self.channels == 1 {
            "mono"
        } else {
            "stereo"
        }
    }
}

/// Transcoder that runs one ffmpeg process per segment.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegTranscoder {
    /// Create a transcoder using the bundled or `PATH` ffmpeg.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: tools::locate("ffmpeg"),
            settings: EncoderSettings::default(),
        }
    }

    /// Use a specific ffmpeg binary.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Override the output encoding.
    #[must_use]
    pub fn with_settings(mut self, settings: EncoderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Get the output encoding.
    pub const fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Fail with [`Error::ToolMissing`] unless ffmpeg can be run.
    pub async fn check(&self) -> Result<()> {
        tools::check(&self.ffmpeg_path, "-version").await
    }

    fn encode_args(&self, stream_locator: &str, padding: Duration) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        // Only the http protocol knows about reconnects.
        if stream_locator.starts_with("http://") || stream_locator.starts_with("https://") {
            args.extend(["-reconnect".to_string(), "1".to_string()]);
        }
        args.extend(["-i".to_string(), stream_locator.to_string()]);

        if !padding.is_zero() {
            args.extend([
                "-af".to_string(),
                format!("apad=pad_dur={}", seconds_arg(padding)),
            ]);
        }

        args.extend(self.settings.output_args());
        args
    }

    fn silence_args(&self, duration: Duration) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-re".to_string(),
            "-t".to_string(),
            seconds_arg(duration),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "anullsrc=channel_layout={}:sample_rate={}",
                self.settings.channel_layout(),
                self.settings.sample_rate
            ),
        ];
        args.extend(self.settings.output_args());
        args
    }

    /// Run `program` and append its stdout to `sink`.
    async fn run_into_sink(
        program: &Path,
        args: &[String],
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("Running {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EncodeFailed {
                code: None,
                message: format!("Failed to spawn ffmpeg: {e}"),
            })?;

        let stderr = process::forward_stderr(child.stderr.take(), "encoder");
        let Some(mut stdout) = child.stdout.take() else {
            process::stop(&mut child, "encoder").await;
            return Err(Error::Internal("Failed to capture ffmpeg stdout".to_string()));
        };

        let copied = process::pump(&mut stdout, sink, cancel).await;
        if cancel.is_cancelled() {
            debug!("Encoder cancelled, stopping ffmpeg");
            process::stop(&mut child, "encoder").await;
            return Ok(());
        }

        match copied {
            Ok(bytes) => debug!("Encoder produced {bytes} bytes"),
            Err(CopyError::Sink(e)) => {
                process::stop(&mut child, "encoder").await;
                return Err(Error::TransportFailed(format!(
                    "Failed to write to pipe: {e}"
                )));
            }
            Err(CopyError::Source(e)) => {
                process::stop(&mut child, "encoder").await;
                return Err(Error::EncodeFailed {
                    code: None,
                    message: format!("Failed to read ffmpeg output: {e}"),
                });
            }
        }

        let status = child.wait().await.map_err(wait_failed)?;
        let summary = process::stderr_summary(stderr).await;
        if !status.success() {
            warn!("ffmpeg {}", process::describe_exit(status, &summary));
            return Err(Error::EncodeFailed {
                code: status.code(),
                message: if summary.is_empty() {
                    "ffmpeg failed".to_string()
                } else {
                    summary
                },
            });
        }

        Ok(())
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn encode(
        &self,
        stream_locator: &str,
        padding: Duration,
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = self.encode_args(stream_locator, padding);
        Self::run_into_sink(&self.ffmpeg_path, &args, sink, cancel).await
    }

    async fn silence(
        &self,
        duration: Duration,
        sink: &mut PipeWriter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Writing {:.1}s of silence", duration.as_secs_f64());
        let args = self.silence_args(duration);
        Self::run_into_sink(&self.ffmpeg_path, &args, sink, cancel).await
    }
}

/// Map a failed wait on the encoder to a per-entry error.
fn wait_failed(e: std::io::Error) -> Error {
    Error::EncodeFailed {
        code: None,
        message: format!("Failed to wait for ffmpeg: {e}"),
    }
}

/// Format a duration as an ffmpeg seconds argument.
fn seconds_arg(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{:.3}", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendj_core::byte_pipe;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_encode_args() {
        let transcoder = FfmpegTranscoder::new();
        let args = transcoder.encode_args("https://cdn.example/audio", Duration::from_secs(5));
        let joined = args.join(" ");
        assert!(joined.starts_with("-hide_banner -loglevel error -reconnect 1 -i https://cdn.example/audio"));
        assert!(joined.contains("-af apad=pad_dur=5"));
        assert!(joined.ends_with("-c:a aac -strict -2 -ar 44100 -b:a 160k -ac 2 -f mpegts pipe:1"));
    }

    #[test]
    fn test_encode_args_local_file_without_padding() {
        let transcoder = FfmpegTranscoder::new();
        let args = transcoder.encode_args("/tmp/song.opus", Duration::ZERO);
        assert!(!args.iter().any(|a| a == "-reconnect"));
        assert!(!args.iter().any(|a| a == "-af"));
    }

    #[test]
    fn test_silence_args() {
        let settings = EncoderSettings {
            channels: 1,
            sample_rate: 48000,
            ..EncoderSettings::default()
        };
        let transcoder = FfmpegTranscoder::new().with_settings(settings);
        let joined = transcoder.silence_args(Duration::from_millis(1500)).join(" ");
        assert!(joined.contains("-re -t 1.500 -f lavfi -i anullsrc=channel_layout=mono:sample_rate=48000"));
        assert!(joined.contains("-ar 48000"));
        assert!(joined.contains("-ac 1"));
    }

    #[test]
    fn test_wait_failure_is_not_fatal() {
        let err = wait_failed(std::io::Error::other("no child"));
        assert!(matches!(err, Error::EncodeFailed { code: None, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_seconds_arg() {
        assert_eq!(seconds_arg(Duration::from_secs(15)), "15");
        assert_eq!(seconds_arg(Duration::from_millis(250)), "0.250");
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_into_sink_appends_output() {
        let (mut writer, mut reader) = byte_pipe(1024);
        let cancel = CancellationToken::new();

        FfmpegTranscoder::run_into_sink(Path::new("sh"), &sh("printf first"), &mut writer, &cancel)
            .await
            .unwrap();
        FfmpegTranscoder::run_into_sink(Path::new("sh"), &sh("printf second"), &mut writer, &cancel)
            .await
            .unwrap();
        drop(writer);

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "firstsecond");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_into_sink_reports_exit_code() {
        let (mut writer, _reader) = byte_pipe(1024);
        let cancel = CancellationToken::new();

        let err = FfmpegTranscoder::run_into_sink(
            Path::new("sh"),
            &sh("printf partial; echo 'Conversion failed!' >&2; exit 3"),
            &mut writer,
            &cancel,
        )
        .await
        .unwrap_err();

        match err {
            Error::EncodeFailed { code, message } => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "Conversion failed!");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_into_sink_broken_pipe_is_transport_failure() {
        let (mut writer, reader) = byte_pipe(16);
        drop(reader);
        let cancel = CancellationToken::new();

        let err = FfmpegTranscoder::run_into_sink(
            Path::new("sh"),
            &sh("printf 'more than nothing'"),
            &mut writer,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::TransportFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_into_sink_cancelled() {
        let (mut writer, _reader) = byte_pipe(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = std::time::Instant::now();
        FfmpegTranscoder::run_into_sink(Path::new("sh"), &sh("sleep 30"), &mut writer, &cancel)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
