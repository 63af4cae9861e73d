//! Dual-stream coordinator: plays an excitation while capturing the response.
//!
//! Capture and playback run on two independent OS threads. Only plain data
//! crosses into them (the excitation buffer, interface ids, scalars and a
//! cloned backend handle); each thread opens its own session. The call returns
//! once both threads have finished, and its result is the capture result.
//!
//! There is no start handshake: the first captured and first played samples
//! are not phase aligned. There is no in-band cancellation either; callers
//! that need a deadline must run this on a thread they can abandon and
//! terminate the process (see `main.rs`).

use std::thread;

use tracing::{debug, error, info};

use crate::audio::{
    AudioBackend, AudioError, AudioResult, Capturer, CodecPolicy, DEFAULT_BLOCK_FRAMES, Direction, InterfaceDescriptor, Player, SampleBuffer,
    SampleFormat,
};

/// What to play and what to capture.
#[derive(Debug, Clone)]
pub struct DuplexRequest<'a> {
    pub excitation: SampleBuffer,
    /// Samples per channel to capture
    pub capture_length: usize,
    pub capture_channels: u16,
    /// `None` records from the default input
    pub input: Option<&'a InterfaceDescriptor>,
    /// `None` plays on the default output
    pub output: Option<&'a InterfaceDescriptor>,
    pub capture_rate: u32,
    pub play_rate: u32,
    /// Normalize the excitation to a peak of 1.0 before playing
    pub normalize: bool,
}

/// Engine settings shared by both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplexSettings {
    pub block_frames: usize,
    pub capture_format: SampleFormat,
    pub playback_format: SampleFormat,
    pub codec_policy: CodecPolicy,
}

impl Default for DuplexSettings {
    fn default() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            capture_format: SampleFormat::I32,
            playback_format: SampleFormat::F32,
            codec_policy: CodecPolicy::default(),
        }
    }
}

/// Play `request.excitation` and capture the response concurrently.
///
/// Playback is best effort: its failure is logged and does not affect the
/// result. A capture failure fails the call.
///
/// # Arguments
/// * `backend` - Driver binding, cloned into each worker thread
/// * `request` - Excitation, capture shape, interfaces and rates
/// * `settings` - Block size, wire formats and decoding policy
///
/// # Returns
/// The captured buffer: `capture_channels` channels of `capture_length` samples.
///
/// # Errors
/// Returns the capture engine's error, or [`AudioError::Worker`] if the
/// capture thread could not run to completion.
pub fn play_and_capture<B: AudioBackend>(backend: &B, request: DuplexRequest<'_>, settings: DuplexSettings) -> AudioResult<SampleBuffer> {
    // Descriptors stay with the caller; only ids go to the workers
    let input = request.input.map(|d| d.id);
    let output = request.output.map(|d| d.id);

    info!(
        "Starting duplex run: playing {} samples x {} channels on {}, capturing {} samples x {} channels on {}",
        request.excitation.len(),
        request.excitation.channel_count(),
        output.map_or_else(|| "default output".to_string(), |id| id.to_string()),
        request.capture_length,
        request.capture_channels,
        input.map_or_else(|| "default input".to_string(), |id| id.to_string()),
    );

    let DuplexRequest { excitation, capture_length, capture_channels, capture_rate, play_rate, normalize, .. } = request;

    let capture_backend = backend.clone();
    let capture = thread::Builder::new()
        .name("playrec-capture".to_string())
        .spawn(move || {
            Capturer::new(capture_backend, settings.codec_policy)
                .with_format(settings.capture_format)
                .with_block_frames(settings.block_frames)
                .capture(capture_length, capture_channels, capture_rate, input)
        })
        .map_err(|e| AudioError::stream(Direction::Input, format!("failed to start capture thread: {}", e)))?;

    let playback_backend = backend.clone();
    let playback = thread::Builder::new().name("playrec-playback".to_string()).spawn(move || {
        Player::new(playback_backend)
            .with_format(settings.playback_format)
            .with_block_frames(settings.block_frames)
            .play(&excitation, play_rate, output, normalize)
    });

    let captured = capture.join();

    match playback {
        Ok(handle) => match handle.join() {
            Ok(Ok(())) => debug!("Playback finished"),
            Ok(Err(e)) => error!("Playback failed, continuing with capture result: {}", e),
            Err(_) => error!("Playback worker panicked, continuing with capture result"),
        },
        Err(e) => error!("Failed to start playback thread: {}", e),
    }

    let captured = captured.map_err(|_| AudioError::Worker { direction: Direction::Input })?;
    if let Err(ref e) = captured {
        error!("Capture failed: {}", e);
    }
    captured
}
