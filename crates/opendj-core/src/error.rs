//! Error types for `OpenDJ`.

use thiserror::Error;

/// Result type alias using `OpenDJ`'s Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for `OpenDJ`.
#[derive(Error, Debug)]
pub enum Error {
    // Queue errors
    #[error("Index {index} out of range for queue of length {len}")]
    OutOfRange { index: isize, len: usize },

    #[error("Can't pop from empty queue")]
    EmptyQueue,

    #[error("There is no song being played")]
    NothingPlaying,

    // Playback errors
    #[error("Failed to resolve media: {0}")]
    ResolutionFailed(String),

    #[error("Encoder exited with {}: {message}", exit_display(*code))]
    EncodeFailed { code: Option<i32>, message: String },

    #[error("Transport failed: {0}")]
    TransportFailed(String),

    #[error("A playback session is already running")]
    AlreadyPlaying,

    #[error("Required tool not available: {0}")]
    ToolMissing(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_display(code: Option<i32>) -> String {
    code.map_or_else(|| "no exit code".to_string(), |c| format!("exit code {c}"))
}

impl Error {
    /// Returns true if this error ends a playback session.
    ///
    /// Encoder failures are tolerated per entry; everything that leaves the
    /// output pipe or the remote connection unusable is not.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResolutionFailed(_)
                | Self::TransportFailed(_)
                | Self::ToolMissing(_)
                | Self::Io(_)
                | Self::Internal(_)
        )
    }

    /// Returns true if this error only reports an invalid queue position.
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}
