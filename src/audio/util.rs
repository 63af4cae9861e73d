//! Shared cpal helpers for the directory and the stream sessions.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfig, SupportedStreamConfigRange};

use super::codec::SampleFormat;
use super::error::{AudioError, AudioResult};
use super::stream::{Direction, InterfaceId};

/// Get a human-readable device name.
///
/// # Arguments
/// * `device` - The audio device
///
/// # Returns
/// Device name string, or "Unknown" if the name cannot be retrieved.
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Map a wire format to the cpal sample format a stream must be built with.
///
/// Packed 24-bit samples have no cpal stream type and yield `None`.
pub fn cpal_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::I16 => Some(cpal::SampleFormat::I16),
        SampleFormat::I32 => Some(cpal::SampleFormat::I32),
        SampleFormat::F32 => Some(cpal::SampleFormat::F32),
        SampleFormat::I24 => None,
    }
}

/// Find a configuration matching exactly the requested layout.
///
/// Unlike a "best effort" search this never substitutes another rate, channel
/// count or format: measurements must run at what the caller asked for.
///
/// # Arguments
/// * `configs` - Iterator of supported stream configurations
/// * `channels` - Required channel count
/// * `sample_rate` - Required sample rate
/// * `format` - Required cpal sample format
///
/// # Returns
/// The matching `SupportedStreamConfig`, or `None` if the device cannot do it.
pub fn find_exact_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    channels: u16,
    sample_rate: u32,
    format: cpal::SampleFormat,
) -> Option<SupportedStreamConfig> {
    configs
        .filter(|config| config.channels() == channels && config.sample_format() == format)
        .find(|config| sample_rate >= config.min_sample_rate() && sample_rate <= config.max_sample_rate())
        .map(|config| config.with_sample_rate(sample_rate))
}

/// Resolve an interface id (enumeration index) or the default device for a direction.
pub fn resolve_device(host: &Host, direction: Direction, interface: Option<InterfaceId>) -> AudioResult<Device> {
    match interface {
        Some(id) => host
            .devices()
            .map_err(|e| AudioError::open(direction, format!("failed to list devices: {}", e)))?
            .nth(id.0)
            .ok_or_else(|| AudioError::open(direction, format!("no interface with id {}", id))),
        None => {
            let device = match direction {
                Direction::Input => host.default_input_device(),
                Direction::Output => host.default_output_device(),
            };
            device.ok_or_else(|| AudioError::open(direction, format!("no default {} device available", direction)))
        }
    }
}

/// Supported configurations of a device in one direction, empty when it has none.
pub fn supported_configs(device: &Device, direction: Direction) -> Vec<SupportedStreamConfigRange> {
    let configs = match direction {
        Direction::Input => device.supported_input_configs().map(|c| c.collect()),
        Direction::Output => device.supported_output_configs().map(|c| c.collect()),
    };
    configs.unwrap_or_default()
}
