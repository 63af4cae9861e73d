//! In-memory backend for exercising the engines without sound hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::directory::InterfaceDescriptor;
use super::error::{AudioError, AudioResult};
use super::stream::{AudioBackend, Direction, InterfaceId, StreamParams, StreamSession};

#[derive(Default)]
struct FakeState {
    interfaces: Vec<InterfaceDescriptor>,
    rejected: Vec<InterfaceId>,
    fail_writes: bool,
    opened: Mutex<Vec<StreamParams>>,
    frames_read: AtomicUsize,
    written: Mutex<Vec<u8>>,
    closed: AtomicUsize,
    dropped_unclosed: AtomicBool,
}

/// Backend with `n` interfaces (ids `0..n`), each with 2 inputs and 2 outputs.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<FakeState>,
}

impl FakeBackend {
    pub fn new(n: usize) -> Self {
        let interfaces = (0..n)
            .map(|i| InterfaceDescriptor {
                id: InterfaceId(i),
                name: format!("Fake interface {}", i),
                is_default_input: i == 0,
                is_default_output: i == 0,
                input_channels: 2,
                output_channels: 2,
                sample_rates: vec![44100, 48000],
                bit_depth: Some(32),
                input_latency: Some((0.01, 0.1)),
                output_latency: Some((0.01, 0.1)),
            })
            .collect();
        Self { state: Arc::new(FakeState { interfaces, ..Default::default() }) }
    }

    /// Refuse to open streams on `id`, as a driver would for an unusable device.
    pub fn rejecting(mut self, id: InterfaceId) -> Self {
        Arc::get_mut(&mut self.state).expect("configure before cloning").rejected.push(id);
        self
    }

    /// Make every `write_all` fail after the stream opened.
    pub fn failing_writes(mut self) -> Self {
        Arc::get_mut(&mut self.state).expect("configure before cloning").fail_writes = true;
        self
    }

    pub fn frames_read(&self) -> usize {
        self.state.frames_read.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn dropped_unclosed(&self) -> bool {
        self.state.dropped_unclosed.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<StreamParams> {
        self.state.opened.lock().clone()
    }

    /// Value the fake input produces for `frame` on `channel`, once decoded.
    pub fn expected_sample(frame: usize, channel: usize) -> f32 {
        code(frame, channel) as f32 / 128.0
    }
}

/// 8-bit pattern placed in the most significant byte of every captured sample.
fn code(frame: usize, channel: usize) -> i64 {
    ((frame * 7 + channel * 13) % 256) as i64 - 128
}

impl AudioBackend for FakeBackend {
    type Session = FakeSession;

    fn interfaces(&self) -> AudioResult<Vec<InterfaceDescriptor>> {
        Ok(self.state.interfaces.clone())
    }

    fn open(&self, params: &StreamParams) -> AudioResult<FakeSession> {
        let id = params.interface.unwrap_or(InterfaceId(0));
        if id.0 >= self.state.interfaces.len() || self.state.rejected.contains(&id) {
            return Err(AudioError::open(params.direction, format!("no interface with id {}", id)));
        }

        self.state.opened.lock().push(params.clone());
        Ok(FakeSession { state: self.state.clone(), params: params.clone(), cursor: 0, closed: false })
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
    params: StreamParams,
    cursor: usize,
    closed: bool,
}

impl StreamSession for FakeSession {
    fn read_block(&mut self, frames: usize) -> AudioResult<Vec<u8>> {
        assert_eq!(self.params.direction, Direction::Input);

        let width = self.params.format.bytes_per_sample();
        let shift = 8 * (width - 1);
        let mut block = Vec::with_capacity(frames * self.params.frame_bytes());

        for frame in self.cursor..self.cursor + frames {
            for channel in 0..self.params.channels as usize {
                let value = code(frame, channel) << shift;
                block.extend_from_slice(&value.to_le_bytes()[..width]);
            }
        }

        self.cursor += frames;
        self.state.frames_read.fetch_add(frames, Ordering::SeqCst);
        Ok(block)
    }

    fn write_all(&mut self, bytes: &[u8]) -> AudioResult<()> {
        assert_eq!(self.params.direction, Direction::Output);

        if self.state.fail_writes {
            return Err(AudioError::stream(Direction::Output, "device unplugged"));
        }
        self.state.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn close(mut self) -> AudioResult<()> {
        self.closed = true;
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.state.dropped_unclosed.store(true, Ordering::SeqCst);
        }
    }
}
