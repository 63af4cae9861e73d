//! Excitation signals for measurements.

use std::f64::consts::PI;

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioResult, SampleBuffer};

/// Exponent applied to the Hann window; tiny, so only the very edges are faded.
const EDGE_WINDOW_EXPONENT: f64 = 0.0025;

/// Frequency progression of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// Exponential frequency progression (equal time per octave)
    #[default]
    Logarithmic,
    /// Frequency grows linearly with time
    Linear,
}

/// Swept-sine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub sample_rate: u32,
    /// Duration in seconds
    pub length: f64,
    pub start_freq: f64,
    pub stop_freq: f64,
    pub mode: SweepMode,
}

impl Sweep {
    /// Number of samples the sweep spans.
    pub fn sample_count(&self) -> usize {
        (self.length * f64::from(self.sample_rate)).floor() as usize
    }

    /// Generate the sweep, softened at both ends so it can be looped.
    ///
    /// Starts at phase -90 degrees, so the sweep is a sine reaching
    /// `stop_freq` at the last sample.
    ///
    /// # Errors
    /// Returns an error if the rate, length or frequencies are not positive, or
    /// the sweep would be shorter than two samples.
    pub fn generate(&self) -> Result<Vec<f32>> {
        if self.sample_rate == 0 {
            bail!("Sample rate must be positive");
        }
        if !(self.start_freq > 0.0 && self.stop_freq > 0.0) {
            bail!("Sweep frequencies must be positive (got {} Hz to {} Hz)", self.start_freq, self.stop_freq);
        }

        let n = self.sample_count();
        if n < 2 {
            bail!("Sweep of {} s at {} Hz is shorter than two samples", self.length, self.sample_rate);
        }

        let rate = f64::from(self.sample_rate);
        let t1 = (n - 1) as f64 / rate;
        let (f0, f1) = (self.start_freq, self.stop_freq);

        let phase = |t: f64| match self.mode {
            SweepMode::Linear => 2.0 * PI * (f0 * t + 0.5 * (f1 - f0) * t * t / t1),
            SweepMode::Logarithmic if f0 == f1 => 2.0 * PI * f0 * t,
            SweepMode::Logarithmic => {
                let ratio = f1 / f0;
                2.0 * PI * f0 * t1 / ratio.ln() * (ratio.powf(t / t1) - 1.0)
            }
        };

        let samples = (0..n)
            .map(|k| {
                let t = k as f64 / rate;
                let hann = 0.5 - 0.5 * (2.0 * PI * k as f64 / (n - 1) as f64).cos();
                (phase(t).sin() * hann.max(0.0).powf(EDGE_WINDOW_EXPONENT)) as f32
            })
            .collect();

        Ok(samples)
    }
}

/// Place `samples` on channel 0 of a `channels`-channel buffer, silence elsewhere.
pub fn on_first_channel(samples: Vec<f32>, channels: usize) -> AudioResult<SampleBuffer> {
    let len = samples.len();
    let mut all = Vec::with_capacity(channels);
    all.push(samples);
    all.extend((1..channels).map(|_| vec![0.0; len]));
    SampleBuffer::from_channels(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(mode: SweepMode) -> Sweep {
        Sweep { sample_rate: 44100, length: 1.0, start_freq: 20.0, stop_freq: 10000.0, mode }
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count()
    }

    #[test]
    fn test_sweep_length_and_bounds() {
        for mode in [SweepMode::Logarithmic, SweepMode::Linear] {
            let samples = sweep(mode).generate().unwrap();
            assert_eq!(samples.len(), 44100);
            assert!(samples.iter().all(|s| s.abs() <= 1.0));
            // Window reaches zero at both edges
            assert_eq!(samples[0], 0.0);
            assert_eq!(samples[samples.len() - 1], 0.0);
        }
    }

    #[test]
    fn test_sweep_frequency_rises() {
        for mode in [SweepMode::Logarithmic, SweepMode::Linear] {
            let samples = sweep(mode).generate().unwrap();
            let tenth = samples.len() / 10;
            assert!(zero_crossings(&samples[..tenth]) < zero_crossings(&samples[samples.len() - tenth..]));
        }
    }

    #[test]
    fn test_fractional_length_is_floored() {
        let sweep = Sweep { length: 0.5001, ..sweep(SweepMode::Linear) };
        assert_eq!(sweep.generate().unwrap().len(), 22054);
    }

    #[test]
    fn test_invalid_sweeps_are_rejected() {
        assert!(Sweep { start_freq: 0.0, ..sweep(SweepMode::Logarithmic) }.generate().is_err());
        assert!(Sweep { length: 0.0, ..sweep(SweepMode::Linear) }.generate().is_err());
        assert!(Sweep { sample_rate: 0, ..sweep(SweepMode::Linear) }.generate().is_err());
    }

    #[test]
    fn test_on_first_channel() {
        let buffer = on_first_channel(vec![0.5; 8], 3).unwrap();
        assert_eq!(buffer.channel_count(), 3);
        assert_eq!(buffer.channel(0).unwrap(), &[0.5; 8]);
        assert!(buffer.channel(2).unwrap().iter().all(|s| *s == 0.0));
    }
}
