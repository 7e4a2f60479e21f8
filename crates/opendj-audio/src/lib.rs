//! # opendj-audio
//!
//! ffmpeg-backed audio plumbing for `OpenDJ`.
//!
//! Features:
//! - One ffmpeg process per queue entry or silence segment, all writing the
//!   same MPEG-TS encoding into the shared pipe
//! - A long-lived ffmpeg relay remuxing the pipe to the streaming endpoint
//! - Prompt teardown of every subprocess on skip or stop

pub mod ffmpeg;
pub mod publish;

mod process;

pub use ffmpeg::{EncoderSettings, FfmpegTranscoder};
pub use publish::FfmpegPublisher;
