//! Application configuration and CLI argument parsing.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::{CodecPolicy, InterfaceId, SampleFormat};
use crate::coordinator::DuplexSettings;
use crate::signal::{Sweep, SweepMode};

/// Time allowed on top of the capture duration before a run is aborted.
const RUN_DEADLINE_MARGIN_SECS: f64 = 10.0;

/// Measurement configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "playrec")]
#[command(author, version, about = "Play a swept sine and capture the response", long_about = None)]
pub struct AppConfig {
    /// List all audio interfaces and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Print the interface list as JSON (with --list-devices)
    #[arg(long)]
    pub json: bool,

    /// Interface id to capture from (default input if omitted)
    #[arg(long, short = 'i', env = "PLAYREC_INPUT_DEVICE")]
    pub input_device: Option<usize>,

    /// Interface id to play on (default output if omitted)
    #[arg(long, short = 'o', env = "PLAYREC_OUTPUT_DEVICE")]
    pub output_device: Option<usize>,

    /// Playback sample rate in Hz
    #[arg(long, short = 'r', default_value = "44100")]
    pub sample_rate: u32,

    /// Capture sample rate in Hz (defaults to the playback rate)
    #[arg(long)]
    pub capture_rate: Option<u32>,

    /// Excitation length in seconds
    #[arg(long, short = 'l', default_value = "1.0", value_parser = parse_positive)]
    pub length: f64,

    /// Sweep start frequency in Hz
    #[arg(long, default_value = "20")]
    pub start_freq: f64,

    /// Sweep stop frequency in Hz (defaults to half the sample rate)
    #[arg(long)]
    pub stop_freq: Option<f64>,

    /// Sweep progression
    #[arg(long, value_enum, default_value = "logarithmic")]
    pub sweep_mode: SweepMode,

    /// Capture length as a multiple of the excitation length
    #[arg(long, default_value = "2.0", value_parser = parse_positive)]
    pub capture_factor: f64,

    /// Channels to capture (defaults to every input of the capture interface)
    #[arg(long)]
    pub capture_channels: Option<u16>,

    /// Channels to play; the sweep goes to the first one (defaults to every output)
    #[arg(long)]
    pub output_channels: Option<u16>,

    /// Normalize the excitation to full scale before playing
    #[arg(long)]
    pub normalize: bool,

    /// Frames per driver block
    #[arg(long, default_value = "1024")]
    pub block_frames: usize,

    /// Sample format requested from the capture interface
    #[arg(long, value_enum, default_value = "i32")]
    pub capture_format: SampleFormat,

    /// Sample format sent to the playback interface
    #[arg(long, value_enum, default_value = "f32")]
    pub playback_format: SampleFormat,

    /// Keep the least significant byte of 32-bit captured samples (dropped by default as noise)
    #[arg(long)]
    pub keep_lowest_byte: bool,

    /// Abort the run after this many seconds (0 = capture duration plus a margin)
    #[arg(long, default_value = "0")]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn input_interface(&self) -> Option<InterfaceId> {
        self.input_device.map(InterfaceId)
    }

    pub fn output_interface(&self) -> Option<InterfaceId> {
        self.output_device.map(InterfaceId)
    }

    /// Get the effective capture rate.
    pub fn effective_capture_rate(&self) -> u32 {
        self.capture_rate.unwrap_or(self.sample_rate)
    }

    /// Get the effective sweep stop frequency (Nyquist if not given).
    pub fn effective_stop_freq(&self) -> f64 {
        self.stop_freq.unwrap_or(f64::from(self.sample_rate) / 2.0)
    }

    pub fn sweep(&self) -> Sweep {
        Sweep {
            sample_rate: self.sample_rate,
            length: self.length,
            start_freq: self.start_freq,
            stop_freq: self.effective_stop_freq(),
            mode: self.sweep_mode,
        }
    }

    /// Samples per channel to capture: `capture_factor` times the excitation's
    /// sample count, converted to the capture rate.
    pub fn capture_length(&self) -> usize {
        if self.sample_rate == 0 {
            return 0;
        }
        let excitation = self.sweep().sample_count() as f64;
        (self.capture_factor * excitation * f64::from(self.effective_capture_rate()) / f64::from(self.sample_rate)).floor() as usize
    }

    pub fn codec_policy(&self) -> CodecPolicy {
        CodecPolicy { discard_lowest_byte: !self.keep_lowest_byte }
    }

    pub fn duplex_settings(&self) -> DuplexSettings {
        DuplexSettings {
            block_frames: self.block_frames,
            capture_format: self.capture_format,
            playback_format: self.playback_format,
            codec_policy: self.codec_policy(),
        }
    }

    /// Overall deadline for one run.
    pub fn run_deadline(&self) -> Duration {
        if self.timeout_secs > 0 {
            return Duration::from_secs(self.timeout_secs);
        }
        let capture_secs = self.capture_length() as f64 / f64::from(self.effective_capture_rate());
        Duration::from_secs_f64(capture_secs.max(self.length) + RUN_DEADLINE_MARGIN_SECS)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.effective_capture_rate() == 0 {
            anyhow::bail!("Sample rates must be positive");
        }

        let nyquist = f64::from(self.sample_rate) / 2.0;
        let stop_freq = self.effective_stop_freq();
        if self.start_freq <= 0.0 {
            anyhow::bail!("Start frequency must be positive");
        }
        if stop_freq <= self.start_freq {
            anyhow::bail!("Stop frequency ({} Hz) must be above the start frequency ({} Hz)", stop_freq, self.start_freq);
        }
        if stop_freq > nyquist {
            anyhow::bail!("Stop frequency ({} Hz) exceeds the Nyquist frequency ({} Hz)", stop_freq, nyquist);
        }

        if self.sweep().sample_count() < 2 {
            anyhow::bail!("Excitation of {} s is too short at {} Hz", self.length, self.sample_rate);
        }

        if self.block_frames == 0 {
            anyhow::bail!("Block size must be at least one frame");
        }

        if !self.capture_format.is_integer() {
            anyhow::bail!("Capture format must be an integer format, got {}", self.capture_format);
        }

        for format in [self.capture_format, self.playback_format] {
            if format == SampleFormat::I24 {
                anyhow::bail!("Packed 24-bit samples cannot be streamed; use i32 instead");
            }
        }

        if self.capture_channels == Some(0) || self.output_channels == Some(0) {
            anyhow::bail!("Channel counts must be at least 1");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Playback rate: {} Hz", self.sample_rate);
        info!("  Capture rate: {} Hz", self.effective_capture_rate());
        info!("  Sweep: {:?} {} Hz -> {} Hz over {} s", self.sweep_mode, self.start_freq, self.effective_stop_freq(), self.length);
        info!("  Capture length: {} samples", self.capture_length());
        info!("  Block size: {} frames", self.block_frames);
        info!("  Formats: capture {}, playback {}", self.capture_format, self.playback_format);
        info!("  Discard lowest byte: {}", !self.keep_lowest_byte);
        info!("  Normalize excitation: {}", self.normalize);
        if let Some(id) = self.input_device {
            info!("  Input device: #{}", id);
        }
        if let Some(id) = self.output_device {
            info!("  Output device: #{}", id);
        }
    }
}

/// Parse and validate a strictly positive number.
fn parse_positive(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if value > 0.0 && value.is_finite() { Ok(value) } else { Err(format!("value must be positive, got {}", value)) }
}
