//! # opendj-playback
//!
//! Queue-driven playback sessions for `OpenDJ`.
//!
//! A [`Dj`] owns the request queue and streams its entries, in order, to a
//! single live endpoint:
//! - a producer loop pops entries, resolves them and appends their encoded
//!   audio to an in-process pipe, filling gaps with silence
//! - a consumer loop relays the pipe to the endpoint
//! - callers get notified through three single-slot handlers

pub mod config;
pub mod dj;
pub mod handlers;

mod session;

pub use config::PlaybackConfig;
pub use dj::Dj;
pub use handlers::Handlers;
