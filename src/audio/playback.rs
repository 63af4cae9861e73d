//! Playback engine: streams a multi-channel buffer to an output interface.
//!
//! The whole buffer is encoded before the stream is opened, so codec errors
//! never leave partial audio on the device. The session is closed on every
//! exit path once it has been opened.

use tracing::{debug, info};

use super::codec::{SampleBuffer, SampleFormat, normalize};
use super::error::{AudioError, AudioResult};
use super::stream::{AudioBackend, DEFAULT_BLOCK_FRAMES, Direction, InterfaceId, StreamParams, StreamSession};

/// Audio player that writes complete buffers and waits until they are flushed.
pub struct Player<B: AudioBackend> {
    backend: B,
    /// Wire format handed to the driver
    format: SampleFormat,
    /// Frames per driver block
    block_frames: usize,
}

impl<B: AudioBackend> Player<B> {
    /// Create a player writing 32-bit float frames.
    pub fn new(backend: B) -> Self {
        Self { backend, format: SampleFormat::F32, block_frames: DEFAULT_BLOCK_FRAMES }
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_block_frames(mut self, block_frames: usize) -> Self {
        self.block_frames = block_frames.max(1);
        self
    }

    /// Play `buffer`, one stream channel per buffer channel.
    ///
    /// This method blocks until all samples have been handed to the device.
    ///
    /// # Arguments
    /// * `buffer` - Samples to play
    /// * `sample_rate` - Stream rate in Hz
    /// * `interface` - Interface to play on, or `None` for the default output
    /// * `normalize` - Scale the buffer so its global peak is 1.0 first
    ///
    /// # Errors
    /// Returns an error if:
    /// - normalization is requested on a silent buffer
    /// - the stream cannot be opened ([`AudioError::DeviceOpen`])
    /// - writing or flushing fails
    pub fn play(&self, buffer: &SampleBuffer, sample_rate: u32, interface: Option<InterfaceId>, normalize_first: bool) -> AudioResult<()> {
        if buffer.is_empty() {
            debug!("Nothing to play");
            return Ok(());
        }

        let bytes = if normalize_first { normalize(buffer)?.encode(self.format)? } else { buffer.encode(self.format)? };

        let channels = u16::try_from(buffer.channel_count())
            .map_err(|_| AudioError::Shape(format!("{} channels exceed what a stream can carry", buffer.channel_count())))?;

        let params = StreamParams {
            direction: Direction::Output,
            interface,
            channels,
            sample_rate,
            format: self.format,
            block_frames: self.block_frames,
        };

        let mut session = self.backend.open(&params)?;

        debug!("Playing {} samples on {} channels at {} Hz", buffer.len(), channels, sample_rate);

        // Close even when the write failed; the write error wins
        let written = session.write_all(&bytes);
        let closed = session.close();
        written?;
        closed?;

        info!("Played {:.2} s on {} channels", buffer.len() as f64 / f64::from(sample_rate), channels);
        Ok(())
    }
}
