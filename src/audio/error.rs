//! Error types for the audio engine.

use thiserror::Error;

use super::stream::Direction;

/// Result alias used across the audio engine.
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors that can occur while encoding, decoding, or streaming audio.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The driver rejected opening a stream (bad id, unsupported rate/channels/format).
    #[error("could not open {direction} stream: {reason}")]
    DeviceOpen { direction: Direction, reason: String },

    /// The host could not list its devices.
    #[error("could not enumerate audio interfaces: {0}")]
    Enumeration(String),

    /// Raw bytes do not form a whole number of frames.
    #[error("invalid raw frame data: {0}")]
    Format(String),

    /// Channels have mismatched lengths or there are none.
    #[error("invalid channel layout: {0}")]
    Shape(String),

    /// Normalization requested on a buffer whose samples are all zero.
    #[error("cannot normalize a silent buffer")]
    DegenerateSignal,

    /// An open stream failed while running.
    #[error("{direction} stream failed: {reason}")]
    Stream { direction: Direction, reason: String },

    /// The request cannot produce any frames.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An engine thread panicked before reporting a result.
    #[error("{direction} worker thread panicked")]
    Worker { direction: Direction },
}

impl AudioError {
    pub(crate) fn open(direction: Direction, reason: impl Into<String>) -> Self {
        Self::DeviceOpen { direction, reason: reason.into() }
    }

    pub(crate) fn stream(direction: Direction, reason: impl Into<String>) -> Self {
        Self::Stream { direction, reason: reason.into() }
    }

    /// The stream side this error belongs to, when there is one.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::DeviceOpen { direction, .. } | Self::Stream { direction, .. } | Self::Worker { direction } => Some(*direction),
            _ => None,
        }
    }
}
