//! Narrow stream I/O contract between the engines and an audio driver binding.
//!
//! The capture and playback engines only ever talk to an [`AudioBackend`]:
//! they open a [`StreamSession`], move raw little-endian bytes through it and
//! close it. The cpal binding lives in [`super::cpal_backend`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::SampleFormat;
use super::directory::InterfaceDescriptor;
use super::error::AudioResult;

/// Frames per driver block unless configured otherwise.
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Stream direction, also used to tell which side of a measurement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Integer handle of an interface, as reported by the interface directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(pub usize);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters of a stream to open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub direction: Direction,
    /// `None` selects the host's default device for `direction`.
    pub interface: Option<InterfaceId>,
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
    /// Frames moved per driver block.
    pub block_frames: usize,
}

impl StreamParams {
    /// Size in bytes of one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

/// An open input or output stream bound to one interface.
///
/// Dropping a session must release it; [`StreamSession::close`] additionally
/// flushes pending output and reports errors from doing so.
pub trait StreamSession {
    /// Block until `frames` interleaved frames have been captured and return their raw bytes.
    fn read_block(&mut self, frames: usize) -> AudioResult<Vec<u8>>;

    /// Queue all of `bytes` for output, blocking while the device catches up.
    fn write_all(&mut self, bytes: &[u8]) -> AudioResult<()>;

    /// Stop the stream, flush queued output and release the device.
    fn close(self) -> AudioResult<()>;
}

/// A driver binding that can enumerate interfaces and open sessions.
///
/// Backends are plain handles: they are cloned into each engine thread and
/// every device object is created on the thread that uses it.
pub trait AudioBackend: Clone + Send + 'static {
    type Session: StreamSession;

    /// Snapshot of the available interfaces.
    fn interfaces(&self) -> AudioResult<Vec<InterfaceDescriptor>>;

    /// Open a stream; fails with [`super::AudioError::DeviceOpen`] when the driver refuses.
    fn open(&self, params: &StreamParams) -> AudioResult<Self::Session>;
}
