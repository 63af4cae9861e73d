//! cpal implementation of the stream I/O contract.
//!
//! cpal delivers samples through real-time callbacks. Each session bridges
//! those callbacks to the blocking `read_block` / `write_all` API with a
//! lock-free byte ring buffer, so the callback never waits on the engine thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, HostId, Sample, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::codec::SampleFormat;
use super::directory::{self, InterfaceDescriptor};
use super::error::{AudioError, AudioResult};
use super::stream::{AudioBackend, Direction, StreamParams, StreamSession};
use super::util::{cpal_format, find_exact_config, get_device_name, resolve_device, supported_configs};

/// Ring buffer size, in driver blocks.
const RING_BLOCKS: usize = 64;

/// Extra time allowed on top of the expected duration before a session gives up.
const STALL_MARGIN: Duration = Duration::from_secs(2);

/// Poll interval while waiting for captured data (keeps latency low).
const INPUT_POLL: Duration = Duration::from_micros(100);

/// Poll interval while waiting for room in the output ring.
const OUTPUT_POLL: Duration = Duration::from_millis(1);

/// Driver error reported by a stream callback, shared with the session.
type ErrorSlot = Arc<Mutex<Option<String>>>;

/// Handle to a cpal host.
///
/// Only the host id is stored: the host, its devices and streams are created on
/// whichever thread opens a session.
#[derive(Debug, Clone, Copy)]
pub struct CpalBackend {
    host: HostId,
}

impl CpalBackend {
    /// Backend bound to the platform's default host.
    pub fn default_host() -> Self {
        Self { host: cpal::default_host().id() }
    }

    pub fn with_host(host: HostId) -> Self {
        Self { host }
    }

    pub fn host_id(&self) -> HostId {
        self.host
    }
}

impl AudioBackend for CpalBackend {
    type Session = CpalSession;

    fn interfaces(&self) -> AudioResult<Vec<InterfaceDescriptor>> {
        let host = cpal::host_from_id(self.host).map_err(|e| AudioError::Enumeration(e.to_string()))?;
        directory::enumerate(&host)
    }

    fn open(&self, params: &StreamParams) -> AudioResult<CpalSession> {
        CpalSession::open(self.host, params)
    }
}

/// Sample types that can travel through the byte ring.
trait WireSample: SizedSample + Send + 'static {
    const WIDTH: usize;

    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! wire_sample {
    ($($ty:ty),*) => {$(
        impl WireSample for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn write_le(self, out: &mut [u8]) {
                out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$ty>::from_le_bytes(raw)
            }
        }
    )*};
}

wire_sample!(i16, i32, f32);

enum Queue {
    Input(ringbuf::HeapCons<u8>),
    Output(ringbuf::HeapProd<u8>),
}

/// An open cpal stream plus the ring buffer feeding or draining it.
pub struct CpalSession {
    stream: Stream,
    queue: Queue,
    error: ErrorSlot,
    /// Frames the driver asked for in its latest output callback
    callback_frames: Arc<AtomicUsize>,
    direction: Direction,
    device_name: String,
    sample_rate: u32,
    frame_bytes: usize,
    block_frames: usize,
}

impl CpalSession {
    fn open(host_id: HostId, params: &StreamParams) -> AudioResult<Self> {
        let direction = params.direction;
        if params.channels == 0 || params.sample_rate == 0 {
            return Err(AudioError::open(direction, "channel count and sample rate must be positive"));
        }

        let host = cpal::host_from_id(host_id).map_err(|e| AudioError::open(direction, e.to_string()))?;
        let device = resolve_device(&host, direction, params.interface)?;
        let device_name = get_device_name(&device);

        let format = cpal_format(params.format)
            .ok_or_else(|| AudioError::open(direction, format!("{} samples cannot be streamed through cpal", params.format)))?;

        let supported = find_exact_config(supported_configs(&device, direction).into_iter(), params.channels, params.sample_rate, format)
            .ok_or_else(|| {
                AudioError::open(
                    direction,
                    format!("{} does not support {} channels at {} Hz as {}", device_name, params.channels, params.sample_rate, params.format),
                )
            })?;
        let config: StreamConfig = supported.config();

        let frame_bytes = params.frame_bytes();
        let block_frames = params.block_frames.max(1);
        let ring = HeapRb::<u8>::new(frame_bytes * block_frames * RING_BLOCKS);
        let (producer, consumer) = ring.split();
        let error: ErrorSlot = Arc::new(Mutex::new(None));
        let callback_frames = Arc::new(AtomicUsize::new(0));

        let (stream, queue) = match direction {
            Direction::Input => (build_input(&device, &config, params.format, producer, error.clone())?, Queue::Input(consumer)),
            Direction::Output => (
                build_output(&device, &config, params.format, consumer, error.clone(), callback_frames.clone())?,
                Queue::Output(producer),
            ),
        };

        stream.play().map_err(|e| AudioError::open(direction, format!("failed to start stream: {}", e)))?;

        info!(
            "Opened {} stream on {}: {} channels, {} Hz, {}",
            direction, device_name, params.channels, params.sample_rate, params.format
        );

        Ok(Self { stream, queue, error, callback_frames, direction, device_name, sample_rate: params.sample_rate, frame_bytes, block_frames })
    }

    /// Time `frames` take at the stream rate, plus the stall margin.
    fn deadline_for(&self, frames: usize) -> Instant {
        Instant::now() + Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate)) + STALL_MARGIN
    }
}

fn check_error(error: &ErrorSlot, direction: Direction) -> AudioResult<()> {
    match error.lock().take() {
        Some(reason) => Err(AudioError::stream(direction, reason)),
        None => Ok(()),
    }
}

/// Pop exactly `len` bytes, waiting for the producer until `deadline`.
fn read_exact<C: Consumer<Item = u8>>(consumer: &mut C, len: usize, error: &ErrorSlot, direction: Direction, deadline: Instant) -> AudioResult<Vec<u8>> {
    let mut block = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        check_error(error, direction)?;

        let read = consumer.pop_slice(&mut block[filled..]);
        filled += read;

        if read == 0 {
            if Instant::now() > deadline {
                return Err(AudioError::stream(direction, format!("timed out after {} of {} bytes", filled, len)));
            }
            std::thread::sleep(INPUT_POLL);
        }
    }

    Ok(block)
}

/// Push all of `bytes` in whole frames, waiting for room until `deadline`.
fn write_frames<P: Producer<Item = u8>>(
    producer: &mut P,
    bytes: &[u8],
    frame_bytes: usize,
    error: &ErrorSlot,
    direction: Direction,
    deadline: Instant,
) -> AudioResult<()> {
    if frame_bytes == 0 || bytes.len() % frame_bytes != 0 {
        return Err(AudioError::stream(direction, format!("{} bytes is not a whole number of {}-byte frames", bytes.len(), frame_bytes)));
    }

    let mut written = 0;
    while written < bytes.len() {
        check_error(error, direction)?;

        // Only whole frames go in, so the callback never sees a split sample
        let room = producer.vacant_len() / frame_bytes * frame_bytes;
        let chunk = room.min(bytes.len() - written);

        if chunk == 0 {
            if Instant::now() > deadline {
                return Err(AudioError::stream(direction, format!("timed out after writing {} of {} bytes", written, bytes.len())));
            }
            std::thread::sleep(OUTPUT_POLL);
            continue;
        }

        written += producer.push_slice(&bytes[written..written + chunk]);
    }

    Ok(())
}

/// Wait until the callback has taken everything queued in the ring.
fn drain<R: Observer>(ring: &R, error: &ErrorSlot, direction: Direction, deadline: Instant) -> AudioResult<()> {
    while !ring.is_empty() {
        check_error(error, direction)?;
        if Instant::now() > deadline {
            return Err(AudioError::stream(direction, "timed out flushing output"));
        }
        std::thread::sleep(OUTPUT_POLL);
    }
    Ok(())
}

/// Copy one input callback into the ring, or flag an overrun.
///
/// Dropping part of a callback would shift every later frame, so a full ring
/// fails the capture instead. Returns whether the data was queued.
fn push_captured<T: WireSample, P: Producer<Item = u8>>(producer: &mut P, data: &[T], error: &ErrorSlot) -> bool {
    if producer.vacant_len() < data.len() * T::WIDTH {
        let mut slot = error.lock();
        if slot.is_none() {
            warn!("Capture ring buffer full, {} samples dropped", data.len());
            *slot = Some("capture buffer overrun".to_string());
        }
        return false;
    }

    let mut scratch = [0u8; 4];
    for &sample in data {
        sample.write_le(&mut scratch);
        producer.push_slice(&scratch[..T::WIDTH]);
    }
    true
}

/// Time to keep an output stream running once the ring is empty: two driver
/// buffers, sized from the latest callback when one has run.
fn flush_tail(callback_frames: usize, fallback_frames: usize, sample_rate: u32) -> Duration {
    let frames = if callback_frames > 0 { callback_frames } else { fallback_frames };
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(2.0 * frames as f64 / f64::from(sample_rate))
}

impl StreamSession for CpalSession {
    fn read_block(&mut self, frames: usize) -> AudioResult<Vec<u8>> {
        let deadline = self.deadline_for(frames);
        let Queue::Input(consumer) = &mut self.queue else {
            return Err(AudioError::stream(self.direction, "cannot read from an output stream"));
        };
        read_exact(consumer, frames * self.frame_bytes, &self.error, self.direction, deadline)
    }

    fn write_all(&mut self, bytes: &[u8]) -> AudioResult<()> {
        let deadline = self.deadline_for(bytes.len() / self.frame_bytes.max(1));
        let Queue::Output(producer) = &mut self.queue else {
            return Err(AudioError::stream(self.direction, "cannot write to an input stream"));
        };
        write_frames(producer, bytes, self.frame_bytes, &self.error, self.direction, deadline)?;

        debug!("Queued {} bytes for output on {}", bytes.len(), self.device_name);
        Ok(())
    }

    fn close(self) -> AudioResult<()> {
        let mut result = Ok(());

        if let Queue::Output(producer) = &self.queue {
            let deadline = self.deadline_for(producer.occupied_len() / self.frame_bytes);
            result = drain(producer, &self.error, self.direction, deadline);

            // Let the device play out what the last callbacks handed it
            if result.is_ok() {
                std::thread::sleep(flush_tail(self.callback_frames.load(Ordering::Relaxed), self.block_frames, self.sample_rate));
            }
        }

        if let Err(e) = self.stream.pause() {
            debug!("Failed to pause {} stream on close: {}", self.direction, e);
        }

        info!("Closed {} stream on {}", self.direction, self.device_name);
        result
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}

fn build_input(device: &Device, config: &StreamConfig, format: SampleFormat, producer: ringbuf::HeapProd<u8>, error: ErrorSlot) -> AudioResult<Stream> {
    let built = match format {
        SampleFormat::I16 => input_stream::<i16>(device, config, producer, error),
        SampleFormat::I32 => input_stream::<i32>(device, config, producer, error),
        SampleFormat::F32 => input_stream::<f32>(device, config, producer, error),
        SampleFormat::I24 => return Err(AudioError::open(Direction::Input, "i24 samples cannot be streamed through cpal")),
    };
    built.map_err(|e| AudioError::open(Direction::Input, format!("failed to build stream: {}", e)))
}

fn build_output(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    consumer: ringbuf::HeapCons<u8>,
    error: ErrorSlot,
    callback_frames: Arc<AtomicUsize>,
) -> AudioResult<Stream> {
    let built = match format {
        SampleFormat::I16 => output_stream::<i16>(device, config, consumer, error, callback_frames),
        SampleFormat::I32 => output_stream::<i32>(device, config, consumer, error, callback_frames),
        SampleFormat::F32 => output_stream::<f32>(device, config, consumer, error, callback_frames),
        SampleFormat::I24 => return Err(AudioError::open(Direction::Output, "i24 samples cannot be streamed through cpal")),
    };
    built.map_err(|e| AudioError::open(Direction::Output, format!("failed to build stream: {}", e)))
}

fn input_stream<T: WireSample>(
    device: &Device,
    config: &StreamConfig,
    mut producer: ringbuf::HeapProd<u8>,
    error: ErrorSlot,
) -> Result<Stream, cpal::BuildStreamError> {
    let overrun = error.clone();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            push_captured(&mut producer, data, &overrun);
        },
        move |err| {
            tracing::error!("Audio capture error: {}", err);
            *error.lock() = Some(err.to_string());
        },
        None,
    )
}

fn output_stream<T: WireSample>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: ringbuf::HeapCons<u8>,
    error: ErrorSlot,
    callback_frames: Arc<AtomicUsize>,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels).max(1);
    let mut scratch = [0u8; 4];

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            callback_frames.store(data.len() / channels, Ordering::Relaxed);
            for sample in data.iter_mut() {
                *sample = if consumer.pop_slice(&mut scratch[..T::WIDTH]) == T::WIDTH { T::read_le(&scratch) } else { <T as Sample>::EQUILIBRIUM };
            }
        },
        move |err| {
            tracing::error!("Audio playback error: {}", err);
            *error.lock() = Some(err.to_string());
        },
        None,
    )
}
