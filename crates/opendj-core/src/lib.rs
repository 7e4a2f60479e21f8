//! # opendj-core
//!
//! Core types, traits, and error handling for the `OpenDJ` radio playback core.

pub mod error;
pub mod pipe;
pub mod tools;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use pipe::{byte_pipe, PipeReader, PipeWriter};
pub use traits::{Publisher, Resolver, Transcoder};
pub use types::*;
