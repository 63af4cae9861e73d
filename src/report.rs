//! Console output: interface listings and capture summaries.

use anyhow::Result;
use serde::Serialize;

use crate::audio::{InterfaceDescriptor, SampleBuffer};

/// Level of one captured channel, in dB relative to full scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelLevel {
    pub channel: usize,
    pub peak_dbfs: f64,
    pub rms_dbfs: f64,
}

fn to_dbfs(amplitude: f64) -> f64 {
    if amplitude > 0.0 { 20.0 * amplitude.log10() } else { f64::NEG_INFINITY }
}

/// Peak and RMS level of every channel of `buffer`.
pub fn channel_levels(buffer: &SampleBuffer) -> Vec<ChannelLevel> {
    buffer
        .channels()
        .iter()
        .enumerate()
        .map(|(channel, samples)| {
            let peak = samples.iter().fold(0.0f64, |acc, s| acc.max(f64::from(s.abs())));
            let rms = if samples.is_empty() {
                0.0
            } else {
                (samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum::<f64>() / samples.len() as f64).sqrt()
            };
            ChannelLevel { channel, peak_dbfs: to_dbfs(peak), rms_dbfs: to_dbfs(rms) }
        })
        .collect()
}

fn format_latency(latency: Option<(f64, f64)>) -> String {
    match latency {
        Some((low, high)) => format!("{:.1}-{:.1} ms", low * 1000.0, high * 1000.0),
        None => "-".to_string(),
    }
}

fn format_interface(descriptor: &InterfaceDescriptor) -> String {
    let marker = match (descriptor.is_default_input, descriptor.is_default_output) {
        (true, true) => "<>",
        (true, false) => "> ",
        (false, true) => " <",
        (false, false) => "  ",
    };
    let rates = descriptor.sample_rates.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(",");
    let bits = descriptor.bit_depth.map_or_else(|| "-".to_string(), |b| b.to_string());

    format!(
        "{} {:<4} {:<32} {:>3} in {:>3} out  {:>4} bit  {}  in {}  out {}",
        marker,
        descriptor.id.to_string(),
        descriptor.name,
        descriptor.input_channels,
        descriptor.output_channels,
        bits,
        rates,
        format_latency(descriptor.input_latency),
        format_latency(descriptor.output_latency),
    )
}

/// Print the interface table.
pub fn print_interfaces(interfaces: &[InterfaceDescriptor]) {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Audio interfaces ({} found)", interfaces.len());
    println!("═══════════════════════════════════════════════════════════════════");

    if interfaces.is_empty() {
        println!("No audio interfaces available.");
        return;
    }

    for descriptor in interfaces {
        println!("{}", format_interface(descriptor));
    }

    println!("{}", "─".repeat(70));
    println!("> default input, < default output");
    println!();
    println!("Usage:");
    println!("  playrec --input-device <ID> --output-device <ID>");
}

/// Print the interface list as pretty JSON.
pub fn print_interfaces_json(interfaces: &[InterfaceDescriptor]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(interfaces)?);
    Ok(())
}

/// Print a per-channel level summary of a capture.
pub fn print_capture_summary(buffer: &SampleBuffer, sample_rate: u32) {
    let seconds = if sample_rate > 0 { buffer.len() as f64 / f64::from(sample_rate) } else { 0.0 };
    println!();
    println!("Captured {} channels x {} samples ({:.2} s at {} Hz)", buffer.channel_count(), buffer.len(), seconds, sample_rate);
    println!("{:<8} {:>12} {:>12}", "CHANNEL", "PEAK dBFS", "RMS dBFS");
    println!("{}", "─".repeat(34));
    for level in channel_levels(buffer) {
        println!("{:<8} {:>12.1} {:>12.1}", level.channel, level.peak_dbfs, level.rms_dbfs);
    }
}
