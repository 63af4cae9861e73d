//! Sample codec: raw interleaved byte frames <-> per-channel float buffers.
//!
//! Raw data is always little endian. Integer samples are two's complement and
//! map to `[-1.0, 1.0)` by dividing by `2^(bits - 1)`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};

/// Binary layout of one sample on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer
    I16,
    /// 24-bit signed integer, packed in 3 bytes
    I24,
    /// 32-bit signed integer
    I32,
    /// 32-bit IEEE float
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    pub fn bits(self) -> usize {
        self.bytes_per_sample() * 8
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SampleFormat::F32)
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleFormat::I16 => write!(f, "i16"),
            SampleFormat::I24 => write!(f, "i24"),
            SampleFormat::I32 => write!(f, "i32"),
            SampleFormat::F32 => write!(f, "f32"),
        }
    }
}

/// Fixed-shape set of per-channel sample sequences.
///
/// Every channel has the same length; neither the channel count nor the
/// length can change after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from per-channel samples.
    ///
    /// # Errors
    /// Returns [`AudioError::Shape`] if there are no channels or their lengths differ.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> AudioResult<Self> {
        frame_count(&channels)?;
        Ok(Self { channels })
    }

    /// A buffer of `channel_count` channels holding `len` zero samples each.
    pub fn silent(channel_count: usize, len: usize) -> AudioResult<Self> {
        Self::from_channels(vec![vec![0.0; len]; channel_count])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Keep at most `len` samples per channel, dropping trailing ones. Never pads.
    pub fn truncated(mut self, len: usize) -> Self {
        for channel in &mut self.channels {
            channel.truncate(len);
        }
        self
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels.iter().flatten().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Interleave and serialize the buffer, see [`encode`].
    pub fn encode(&self, format: SampleFormat) -> AudioResult<Vec<u8>> {
        encode(&self.channels, format)
    }
}

/// Decoding policy for hardware quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPolicy {
    /// Ignore the least significant byte of 32-bit samples, leaving a 24-bit value.
    /// Some interfaces fill it with noise. Has no effect on other widths.
    pub discard_lowest_byte: bool,
}

impl Default for CodecPolicy {
    fn default() -> Self {
        Self { discard_lowest_byte: true }
    }
}

/// Decoder for raw interleaved integer frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCodec {
    policy: CodecPolicy,
}

impl SampleCodec {
    pub fn new(policy: CodecPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CodecPolicy {
        self.policy
    }

    /// De-interleave little-endian signed integer frames into per-channel samples.
    ///
    /// # Arguments
    /// * `raw` - Interleaved frames as delivered by an input stream
    /// * `channel_count` - Channels per frame
    /// * `bytes_per_sample` - Sample width, 1 to 4 bytes
    ///
    /// # Returns
    /// A buffer with `raw.len() / (channel_count * bytes_per_sample)` samples per channel.
    ///
    /// # Errors
    /// Returns [`AudioError::Format`] if the width or channel count is invalid, or
    /// if `raw` does not hold a whole number of frames.
    pub fn decode(&self, raw: &[u8], channel_count: usize, bytes_per_sample: usize) -> AudioResult<SampleBuffer> {
        if channel_count == 0 {
            return Err(AudioError::Format("channel count must be at least 1".to_string()));
        }
        if !(1..=4).contains(&bytes_per_sample) {
            return Err(AudioError::Format(format!("unsupported sample width of {} bytes", bytes_per_sample)));
        }

        let frame_bytes = channel_count * bytes_per_sample;
        if raw.len() % frame_bytes != 0 {
            return Err(AudioError::Format(format!(
                "{} bytes is not a whole number of {}-byte frames ({} channels x {} bytes)",
                raw.len(),
                frame_bytes,
                channel_count,
                bytes_per_sample
            )));
        }

        let skip = usize::from(self.policy.discard_lowest_byte && bytes_per_sample == 4);
        let bits = (bytes_per_sample - skip) * 8;
        let scale = 1.0 / (1i64 << (bits - 1)) as f64;

        let frames = raw.len() / frame_bytes;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in raw.chunks_exact(frame_bytes) {
            for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(bytes_per_sample)) {
                channel.push((signed_value(&sample[skip..]) as f64 * scale) as f32);
            }
        }

        SampleBuffer::from_channels(channels)
    }
}

/// Assemble little-endian bytes into a two's-complement integer.
fn signed_value(bytes: &[u8]) -> i64 {
    let mut value = bytes.iter().rev().fold(0i64, |acc, &b| (acc << 8) | i64::from(b));
    if bytes.last().is_some_and(|msb| msb & 0x80 != 0) {
        value -= 1i64 << (8 * bytes.len());
    }
    value
}

/// Validate a channel set and return its common length.
fn frame_count<C: AsRef<[f32]>>(channels: &[C]) -> AudioResult<usize> {
    let first = channels.first().ok_or_else(|| AudioError::Shape("at least one channel is required".to_string()))?;
    let frames = first.as_ref().len();

    for (index, channel) in channels.iter().enumerate().skip(1) {
        let len = channel.as_ref().len();
        if len != frames {
            return Err(AudioError::Shape(format!("channel {} has {} samples, channel 0 has {}", index, len, frames)));
        }
    }

    Ok(frames)
}

/// Interleave channels frame by frame and serialize each sample as `format`.
///
/// Integer formats clamp samples to `[-1.0, 1.0]` and saturate at the largest
/// positive code.
///
/// # Errors
/// Returns [`AudioError::Shape`] if there are no channels or their lengths differ.
pub fn encode<C: AsRef<[f32]>>(channels: &[C], format: SampleFormat) -> AudioResult<Vec<u8>> {
    let frames = frame_count(channels)?;
    let mut out = Vec::with_capacity(frames * channels.len() * format.bytes_per_sample());

    for index in 0..frames {
        for channel in channels {
            write_sample(&mut out, channel.as_ref()[index], format);
        }
    }

    Ok(out)
}

fn write_sample(out: &mut Vec<u8>, sample: f32, format: SampleFormat) {
    if format == SampleFormat::F32 {
        out.extend_from_slice(&sample.to_le_bytes());
        return;
    }

    let full_scale = 1i64 << (format.bits() - 1);
    let code = (f64::from(sample.clamp(-1.0, 1.0)) * full_scale as f64).round() as i64;
    let code = code.clamp(-full_scale, full_scale - 1);
    out.extend_from_slice(&code.to_le_bytes()[..format.bytes_per_sample()]);
}

/// Scale every channel by the same factor so the global peak becomes 1.0.
///
/// # Errors
/// Returns [`AudioError::DegenerateSignal`] if every sample is zero.
pub fn normalize(buffer: &SampleBuffer) -> AudioResult<SampleBuffer> {
    let peak = buffer.peak();
    if peak == 0.0 {
        return Err(AudioError::DegenerateSignal);
    }

    let channels = buffer.channels.iter().map(|channel| channel.iter().map(|s| s / peak).collect()).collect();
    Ok(SampleBuffer { channels })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(channel_count: usize, len: usize) -> SampleBuffer {
        let channels = (0..channel_count)
            .map(|c| (0..len).map(|n| 0.9 * ((n as f32) * 0.01 * (c as f32 + 1.0)).sin()).collect())
            .collect();
        SampleBuffer::from_channels(channels).unwrap()
    }

    fn assert_close(a: &SampleBuffer, b: &SampleBuffer, tolerance: f32) {
        assert_eq!(a.channel_count(), b.channel_count());
        assert_eq!(a.len(), b.len());
        for (ca, cb) in a.channels().iter().zip(b.channels()) {
            for (x, y) in ca.iter().zip(cb) {
                assert!((x - y).abs() <= tolerance, "{} vs {} exceeds {}", x, y, tolerance);
            }
        }
    }

    #[test]
    fn test_round_trip_integer_formats() {
        let original = test_signal(3, 500);
        let codec = SampleCodec::new(CodecPolicy { discard_lowest_byte: false });

        for format in [SampleFormat::I16, SampleFormat::I24, SampleFormat::I32] {
            let raw = original.encode(format).unwrap();
            let decoded = codec.decode(&raw, 3, format.bytes_per_sample()).unwrap();
            let step = 1.0 / (1i64 << (format.bits() - 1)) as f32;
            assert_close(&original, &decoded, step.max(f32::EPSILON));
        }
    }

    #[test]
    fn test_round_trip_f32_is_exact() {
        let original = test_signal(2, 200);
        let raw = original.encode(SampleFormat::F32).unwrap();
        assert_eq!(raw.len(), 2 * 200 * 4);

        let samples: Vec<f32> = raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        let channels = vec![samples.iter().step_by(2).copied().collect(), samples.iter().skip(1).step_by(2).copied().collect()];
        assert_eq!(SampleBuffer::from_channels(channels).unwrap(), original);
    }

    #[test]
    fn test_round_trip_i32_with_lowest_byte_discarded() {
        let original = test_signal(2, 300);
        let raw = original.encode(SampleFormat::I32).unwrap();
        let decoded = SampleCodec::default().decode(&raw, 2, 4).unwrap();
        // 24 effective bits remain
        assert_close(&original, &decoded, 2.0 / (1 << 23) as f32);
    }

    #[test]
    fn test_decode_length_law() {
        let codec = SampleCodec::default();
        let decoded = codec.decode(&[0u8; 60], 3, 2).unwrap();
        assert_eq!(decoded.channel_count(), 3);
        assert_eq!(decoded.len(), 10);

        assert!(matches!(codec.decode(&[0u8; 61], 3, 2), Err(AudioError::Format(_))));
        assert!(matches!(codec.decode(&[0u8; 8], 0, 2), Err(AudioError::Format(_))));
        assert!(matches!(codec.decode(&[0u8; 10], 1, 5), Err(AudioError::Format(_))));
    }

    #[test]
    fn test_decode_empty_input() {
        let decoded = SampleCodec::default().decode(&[], 2, 4).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_deinterleaves() {
        // Two 16-bit channels, frames (1, 2) and (3, -4)
        let raw = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0xFC, 0xFF];
        let decoded = SampleCodec::default().decode(&raw, 2, 2).unwrap();
        let step = 1.0 / 32768.0;
        assert_eq!(decoded.channel(0).unwrap(), &[step, 3.0 * step]);
        assert_eq!(decoded.channel(1).unwrap(), &[2.0 * step, -4.0 * step]);
    }

    #[test]
    fn test_sign_correctness_16_and_24_bit() {
        let codec = SampleCodec::default();

        let max16 = codec.decode(&[0xFF, 0x7F], 1, 2).unwrap().channel(0).unwrap()[0];
        let min16 = codec.decode(&[0x00, 0x80], 1, 2).unwrap().channel(0).unwrap()[0];
        assert!(max16 > 0.0 && min16 < 0.0);
        assert!((max16 + min16).abs() <= 1.0 / 32768.0);
        assert_eq!(min16, -1.0);

        let max24 = codec.decode(&[0xFF, 0xFF, 0x7F], 1, 3).unwrap().channel(0).unwrap()[0];
        let min24 = codec.decode(&[0x00, 0x00, 0x80], 1, 3).unwrap().channel(0).unwrap()[0];
        assert!(max24 > 0.0 && min24 < 0.0);
        assert!((max24 + min24).abs() <= 1.0 / (1 << 23) as f32);

        let minus_one = codec.decode(&[0xFF, 0xFF, 0xFF], 1, 3).unwrap().channel(0).unwrap()[0];
        assert_eq!(minus_one, -1.0 / (1 << 23) as f32);
    }

    #[test]
    fn test_sign_correctness_32_bit_policies() {
        let discard = SampleCodec::default();
        let max = discard.decode(&[0x12, 0xFF, 0xFF, 0x7F], 1, 4).unwrap().channel(0).unwrap()[0];
        let min = discard.decode(&[0xAB, 0x00, 0x00, 0x80], 1, 4).unwrap().channel(0).unwrap()[0];
        assert!(max > 0.0 && min < 0.0);
        assert_eq!(min, -1.0);
        assert!((max + min).abs() <= 1.0 / (1 << 23) as f32);

        // The lowest byte alone must not change the value when discarded
        let noisy = discard.decode(&[0x7F, 0x00, 0x01, 0x00], 1, 4).unwrap().channel(0).unwrap()[0];
        let clean = discard.decode(&[0x00, 0x00, 0x01, 0x00], 1, 4).unwrap().channel(0).unwrap()[0];
        assert_eq!(noisy, clean);

        let keep = SampleCodec::new(CodecPolicy { discard_lowest_byte: false });
        let max = keep.decode(&[0xFF, 0xFF, 0xFF, 0x7F], 1, 4).unwrap().channel(0).unwrap()[0];
        let min = keep.decode(&[0x00, 0x00, 0x00, 0x80], 1, 4).unwrap().channel(0).unwrap()[0];
        assert!(max > 0.0 && min < 0.0);
        assert_eq!(min, -1.0);
    }

    #[test]
    fn test_encode_interleaves_frame_major() {
        let buffer = SampleBuffer::from_channels(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        let raw = buffer.encode(SampleFormat::F32).unwrap();

        let samples: Vec<f32> = raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        assert_eq!(samples, vec![0.1, 0.3, 0.2, 0.4]);
    }

    #[test]
    fn test_encode_saturates_integer_formats() {
        let raw = encode(&[vec![1.0f32, -1.0, 2.0]], SampleFormat::I16).unwrap();
        assert_eq!(raw, vec![0xFF, 0x7F, 0x00, 0x80, 0xFF, 0x7F]);
    }

    #[test]
    fn test_encode_rejects_ragged_channels() {
        let ragged = vec![vec![0.0f32; 4], vec![0.0; 3]];
        assert!(matches!(encode(&ragged, SampleFormat::F32), Err(AudioError::Shape(_))));
        assert!(matches!(encode::<Vec<f32>>(&[], SampleFormat::F32), Err(AudioError::Shape(_))));
        assert!(matches!(SampleBuffer::from_channels(ragged), Err(AudioError::Shape(_))));
    }

    #[test]
    fn test_normalize_uses_global_peak() {
        let buffer = SampleBuffer::from_channels(vec![vec![0.1, -0.25], vec![0.05, 0.2]]).unwrap();
        let normalized = normalize(&buffer).unwrap();

        assert!((normalized.peak() - 1.0).abs() < 1e-6);
        // Relative levels between channels are preserved
        assert!((normalized.channel(0).unwrap()[0] - 0.4).abs() < 1e-6);
        assert!((normalized.channel(1).unwrap()[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_silent_buffer_fails() {
        let silent = SampleBuffer::silent(2, 16).unwrap();
        assert!(matches!(normalize(&silent), Err(AudioError::DegenerateSignal)));
    }

    #[test]
    fn test_truncated_never_pads() {
        let buffer = test_signal(2, 10);
        assert_eq!(buffer.clone().truncated(4).len(), 4);
        assert_eq!(buffer.truncated(20).len(), 10);
    }
}
