//! # opendj-extractor
//!
//! Media resolution for `OpenDJ` using yt-dlp.
//!
//! Features:
//! - Resolves request URLs to direct audio stream URLs for the transcoder
//! - Looks up title and duration so requests can be queued with metadata
//! - Optional browser cookie authentication for restricted media

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use opendj_core::tools;
use opendj_core::{Error, MediaDescriptor, Resolver, Result};

/// Authentication method for yt-dlp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthMethod {
    /// Use cookies from a browser (needed for age-gated or members-only media).
    BrowserCookies(String),
    /// No authentication.
    #[default]
    None,
}

impl AuthMethod {
    fn to_args(&self) -> Vec<String> {
        match self {
            Self::BrowserCookies(browser) => {
                vec!["--cookies-from-browser".to_string(), browser.clone()]
            }
            Self::None => vec![],
        }
    }
}

/// Metadata fields read from `yt-dlp --dump-single-json`.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    webpage_url: Option<String>,
}

/// yt-dlp backed resolver.
#[derive(Debug, Clone)]
pub struct YtDlp {
    yt_dlp_path: PathBuf,
    auth_method: AuthMethod,
    format: String,
}

impl YtDlp {
    /// Create a resolver using the bundled or `PATH` yt-dlp.
    pub fn new() -> Self {
        Self {
            yt_dlp_path: tools::locate("yt-dlp"),
            auth_method: AuthMethod::default(),
            format: "bestaudio".to_string(),
        }
    }

    /// Use a specific yt-dlp binary.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.yt_dlp_path = path.into();
        self
    }

    /// Set the authentication method.
    #[must_use]
    pub fn with_auth_method(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Set browser cookies as the authentication method.
    #[must_use]
    pub fn with_browser_cookies(mut self, browser: impl Into<String>) -> Self {
        self.auth_method = AuthMethod::BrowserCookies(browser.into());
        self
    }

    /// Override the yt-dlp format selector (default `bestaudio`).
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Get the current authentication method.
    pub fn auth_method(&self) -> &AuthMethod {
        &self.auth_method
    }

    /// Fail with [`Error::ToolMissing`] unless yt-dlp can be run.
    pub async fn check(&self) -> Result<()> {
        tools::check(&self.yt_dlp_path, "--version").await
    }

    fn resolve_args(&self, locator: &str) -> Vec<String> {
        let mut args = self.auth_method.to_args();
        args.extend([
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-g".to_string(),
            locator.to_string(),
        ]);
        args
    }

    fn describe_args(&self, locator: &str) -> Vec<String> {
        let mut args = self.auth_method.to_args();
        args.extend([
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--dump-single-json".to_string(),
            locator.to_string(),
        ]);
        args
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        debug!("Running yt-dlp {}", args.join(" "));

        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ResolutionFailed(format!("Failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp stderr: {}", stderr.trim());
            return Err(Error::ResolutionFailed(format!(
                "yt-dlp failed: {}",
                tools::first_line(&output.stderr)
            )));
        }

        Ok(output.stdout)
    }

    /// Look up title and duration for `locator`.
    pub async fn describe(&self, locator: &str) -> Result<MediaDescriptor> {
        let stdout = self.run(&self.describe_args(locator)).await?;
        let media = parse_video_info(&stdout, locator)?;
        info!("Described {} ({})", media.title, media.duration_display());
        Ok(media)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for YtDlp {
    async fn resolve(&self, locator: &str) -> Result<String> {
        let stdout = self.run(&self.resolve_args(locator)).await?;
        let stream_url = parse_stream_url(&stdout)?;
        debug!("Resolved {locator} to a {} byte stream URL", stream_url.len());
        Ok(stream_url)
    }
}

/// Pick the stream URL out of `yt-dlp -g` output.
///
/// Formats with separate audio and video print one URL per line; the audio
/// selector yields a single line.
fn parse_stream_url(stdout: &[u8]) -> Result<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::ResolutionFailed("yt-dlp returned no stream URL".to_string()))
}

fn parse_video_info(stdout: &[u8], locator: &str) -> Result<MediaDescriptor> {
    let info: VideoInfo = serde_json::from_slice(stdout)
        .map_err(|e| Error::ResolutionFailed(format!("Unreadable yt-dlp metadata: {e}")))?;

    let duration = info
        .duration
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::ZERO);

    Ok(MediaDescriptor::new(
        info.title,
        info.webpage_url.unwrap_or_else(|| locator.to_string()),
        duration,
    ))
}
