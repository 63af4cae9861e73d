//! Audio engine: sample codec, stream sessions, capture and playback.
//!
//! The engines talk to hardware only through [`AudioBackend`]; the cpal
//! binding is [`CpalBackend`].

mod capture;
pub mod codec;
pub mod cpal_backend;
pub mod directory;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
mod playback;
pub mod stream;
pub mod util;

pub use capture::Capturer;
pub use codec::{CodecPolicy, SampleBuffer, SampleCodec, SampleFormat};
pub use cpal_backend::CpalBackend;
pub use directory::InterfaceDescriptor;
pub use error::{AudioError, AudioResult};
pub use playback::Player;
pub use stream::{AudioBackend, DEFAULT_BLOCK_FRAMES, Direction, InterfaceId, StreamParams, StreamSession};
