//! # `OpenDJ`
//!
//! Streams a shared queue of online media to a live RTMP endpoint.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::AppConfig;
use opendj_audio::{FfmpegPublisher, FfmpegTranscoder};
use opendj_core::QueueEntry;
use opendj_extractor::YtDlp;
use opendj_playback::Dj;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opendj=info,opendj_playback=debug".into()),
        )
        .init();

    info!("Starting OpenDJ v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::discover()?;
    let endpoint = config.endpoint()?.to_owned();

    let mut extractor = YtDlp::new();
    if let Some(browser) = &config.cookies_browser {
        extractor = extractor.with_browser_cookies(browser.clone());
    }
    let extractor = Arc::new(extractor);
    let transcoder = Arc::new(FfmpegTranscoder::new());

    extractor.check().await.context("yt-dlp is not usable")?;
    transcoder.check().await.context("ffmpeg is not usable")?;

    let entries = seed_queue(&extractor, &config).await;
    info!("Queued {} of {} seed entries", entries.len(), config.seed.len());

    let dj = Dj::new(extractor, transcoder, Arc::new(FfmpegPublisher::new()))
        .with_config(config.playback.clone())
        .with_queue(entries);
    register_handlers(&dj);
    let dj = Arc::new(dj);

    let mut session = tokio::spawn({
        let dj = dj.clone();
        async move { dj.play(&endpoint).await }
    });

    tokio::select! {
        finished = &mut session => {
            finished??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping playback");
            dj.stop();
        }
    }

    session.await??;
    Ok(())
}

/// Look up every seed entry, skipping the ones that cannot be described.
async fn seed_queue(extractor: &YtDlp, config: &AppConfig) -> Vec<QueueEntry> {
    let mut entries = Vec::with_capacity(config.seed.len());

    for seed in &config.seed {
        match extractor.describe(&seed.url).await {
            Ok(media) => {
                let mut entry = QueueEntry::new(media, seed.owner.clone());
                if let Some(dedication) = &seed.dedication {
                    entry = entry.with_dedication(dedication.clone());
                }
                entries.push(entry);
            }
            Err(e) => warn!("Skipping {}: {e}", seed.url),
        }
    }
    entries
}

fn register_handlers(dj: &Dj) {
    dj.on_new_song(|entry| {
        info!(
            owner = %entry.owner,
            "Now playing: {} [{}]",
            entry.media.title,
            entry.media.duration_display()
        );
        if let Some(dedication) = &entry.dedication {
            info!("Dedicated {dedication}");
        }
    });

    dj.on_end_of_song(|entry, error| match error {
        Some(e) => warn!("Finished {} with error: {e}", entry.media.title),
        None => info!("Finished {}", entry.media.title),
    });

    dj.on_playback_error(|e| error!("Playback stopped: {e}"));
}
