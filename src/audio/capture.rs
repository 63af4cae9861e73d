//! Capture engine: reads a fixed number of frames from an input stream.
//!
//! Reads whole driver blocks, decodes each one as it arrives and trims the
//! result to the requested length. The call blocks until every block is read.

use tracing::{debug, info, warn};

use super::codec::{CodecPolicy, SampleBuffer, SampleCodec, SampleFormat};
use super::error::{AudioError, AudioResult};
use super::stream::{AudioBackend, DEFAULT_BLOCK_FRAMES, Direction, InterfaceId, StreamParams, StreamSession};

/// Audio capturer producing fixed-length multi-channel recordings.
pub struct Capturer<B: AudioBackend> {
    backend: B,             // Driver binding used to open the input session
    codec: SampleCodec,     // Raw frame decoder
    format: SampleFormat,   // Wire format requested from the driver
    block_frames: usize,    // Frames per blocking read
}

impl<B: AudioBackend> Capturer<B> {
    /// Create a capturer reading 32-bit integer frames in blocks of
    /// [`DEFAULT_BLOCK_FRAMES`].
    pub fn new(backend: B, policy: CodecPolicy) -> Self {
        Self { backend, codec: SampleCodec::new(policy), format: SampleFormat::I32, block_frames: DEFAULT_BLOCK_FRAMES }
    }

    /// Use another integer wire format.
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_block_frames(mut self, block_frames: usize) -> Self {
        self.block_frames = block_frames.max(1);
        self
    }

    /// Capture exactly `length` samples on each of `channels` channels.
    ///
    /// The length is rounded up to whole blocks for reading; trailing samples
    /// are dropped before returning.
    ///
    /// # Arguments
    /// * `length` - Samples per channel to return
    /// * `channels` - Number of input channels to open
    /// * `sample_rate` - Stream rate in Hz
    /// * `interface` - Interface to record from, or `None` for the default input
    ///
    /// # Errors
    /// Returns an error if:
    /// - `length` or `channels` is zero
    /// - the stream cannot be opened ([`AudioError::DeviceOpen`])
    /// - a read or decode fails, or fewer frames than requested arrive
    pub fn capture(&self, length: usize, channels: u16, sample_rate: u32, interface: Option<InterfaceId>) -> AudioResult<SampleBuffer> {
        if length == 0 {
            return Err(AudioError::InvalidRequest("capture length must be at least one sample".to_string()));
        }
        if channels == 0 {
            return Err(AudioError::InvalidRequest("capture needs at least one channel".to_string()));
        }
        if !self.format.is_integer() {
            return Err(AudioError::open(Direction::Input, format!("capture needs an integer sample format, got {}", self.format)));
        }

        let blocks = length.div_ceil(self.block_frames);
        let params = StreamParams {
            direction: Direction::Input,
            interface,
            channels,
            sample_rate,
            format: self.format,
            block_frames: self.block_frames,
        };

        debug!(
            "Capturing {} samples as {} blocks of {} frames ({} frames read)",
            length,
            blocks,
            self.block_frames,
            blocks * self.block_frames
        );

        let mut session = self.backend.open(&params)?;

        let captured = match self.read_blocks(&mut session, blocks, channels as usize) {
            Ok(captured) => captured,
            Err(e) => {
                if let Err(close_err) = session.close() {
                    debug!("Failed to close input stream after error: {}", close_err);
                }
                return Err(e);
            }
        };

        if let Err(e) = session.close() {
            warn!("Input stream did not close cleanly: {}", e);
        }

        let available = captured.len();
        if available < length {
            return Err(AudioError::stream(Direction::Input, format!("only {} of {} samples were captured", available, length)));
        }

        info!("Captured {} samples on {} channels at {} Hz", length, channels, sample_rate);
        Ok(captured.truncated(length))
    }

    /// Read and decode `blocks` blocks, appending per channel.
    fn read_blocks(&self, session: &mut B::Session, blocks: usize, channels: usize) -> AudioResult<SampleBuffer> {
        let mut collected: Vec<Vec<f32>> = vec![Vec::with_capacity(blocks * self.block_frames); channels];

        for _ in 0..blocks {
            let raw = session.read_block(self.block_frames)?;
            let decoded = self.codec.decode(&raw, channels, self.format.bytes_per_sample())?;

            for (all, block) in collected.iter_mut().zip(decoded.into_channels()) {
                all.extend(block);
            }
        }

        SampleBuffer::from_channels(collected)
    }
}
