//! Interface directory: immutable snapshots of the host's sound interfaces.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, DeviceId, Host, SupportedBufferSize, SupportedStreamConfig};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{AudioError, AudioResult};
use super::stream::{Direction, InterfaceId};
use super::util::{get_device_name, supported_configs};

/// Rates probed in addition to a device's default rate.
const PROBED_SAMPLE_RATES: [u32; 5] = [22050, 44100, 48000, 96000, 192000];

/// Snapshot of one interface's capabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceDescriptor {
    pub id: InterfaceId,
    pub name: String,
    pub is_default_input: bool,
    pub is_default_output: bool,
    pub input_channels: u16,
    pub output_channels: u16,
    /// Supported rates in Hz, default rate first.
    pub sample_rates: Vec<u32>,
    /// Bits per sample of the default configuration.
    pub bit_depth: Option<u16>,
    /// (low, high) input latency in seconds.
    pub input_latency: Option<(f64, f64)>,
    /// (low, high) output latency in seconds.
    pub output_latency: Option<(f64, f64)>,
}

impl InterfaceDescriptor {
    pub fn channels(&self, direction: Direction) -> u16 {
        match direction {
            Direction::Input => self.input_channels,
            Direction::Output => self.output_channels,
        }
    }
}

/// The descriptor flagged as default input, if any.
pub fn default_input(interfaces: &[InterfaceDescriptor]) -> Option<&InterfaceDescriptor> {
    interfaces.iter().find(|d| d.is_default_input)
}

/// The descriptor flagged as default output, if any.
pub fn default_output(interfaces: &[InterfaceDescriptor]) -> Option<&InterfaceDescriptor> {
    interfaces.iter().find(|d| d.is_default_output)
}

/// Look a descriptor up by id.
pub fn find(interfaces: &[InterfaceDescriptor], id: InterfaceId) -> Option<&InterfaceDescriptor> {
    interfaces.iter().find(|d| d.id == id)
}

/// Pick the interface for one side of a run: `requested` if given, otherwise
/// the default for `direction`. The interface must have channels on that side.
///
/// # Errors
/// Returns [`AudioError::DeviceOpen`] naming the side when nothing suitable exists.
pub fn select(interfaces: &[InterfaceDescriptor], requested: Option<InterfaceId>, direction: Direction) -> AudioResult<&InterfaceDescriptor> {
    let descriptor = match requested {
        Some(id) => find(interfaces, id).ok_or_else(|| AudioError::open(direction, format!("no interface with id {}", id)))?,
        None => match direction {
            Direction::Input => default_input(interfaces),
            Direction::Output => default_output(interfaces),
        }
        .ok_or_else(|| AudioError::open(direction, format!("no default {} interface could be found", direction)))?,
    };

    if descriptor.channels(direction) == 0 {
        return Err(AudioError::open(direction, format!("interface {} ({}) has no {} channels", descriptor.id, descriptor.name, direction)));
    }

    Ok(descriptor)
}

/// How a device is recognized: the backend's stable id when the host can
/// report one, and the display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceKey<I> {
    pub id: Option<I>,
    pub name: String,
}

fn device_key(device: &Device) -> DeviceKey<DeviceId> {
    DeviceKey { id: device.id().ok(), name: get_device_name(device) }
}

/// Whether `device` is the host default described by `default`.
///
/// Ids are compared when both sides have one; names are only a fallback, since
/// identical interfaces share a name.
fn matches_default<I: PartialEq>(device: &DeviceKey<I>, default: Option<&DeviceKey<I>>) -> bool {
    match default {
        Some(default) => match (&device.id, &default.id) {
            (Some(id), Some(default_id)) => id == default_id,
            _ => device.name == default.name,
        },
        None => false,
    }
}

/// `(is_default_input, is_default_output)` for one device. Both sides are
/// checked independently, so a device may be the default for both.
pub(crate) fn default_flags<I: PartialEq>(
    device: &DeviceKey<I>,
    input_channels: u16,
    output_channels: u16,
    default_input: Option<&DeviceKey<I>>,
    default_output: Option<&DeviceKey<I>>,
) -> (bool, bool) {
    let is_input = input_channels > 0 && matches_default(device, default_input);
    let is_output = output_channels > 0 && matches_default(device, default_output);
    (is_input, is_output)
}

/// Enumerate every device of `host`.
///
/// Ids are enumeration indices, so they stay valid only while the set of
/// devices does not change.
///
/// # Errors
/// Returns [`AudioError::Enumeration`] if the host cannot list its devices.
pub fn enumerate(host: &Host) -> AudioResult<Vec<InterfaceDescriptor>> {
    let default_input = host.default_input_device().map(|d| device_key(&d));
    let default_output = host.default_output_device().map(|d| device_key(&d));

    let devices = host.devices().map_err(|e| AudioError::Enumeration(e.to_string()))?;

    let interfaces: Vec<InterfaceDescriptor> = devices
        .enumerate()
        .map(|(index, device)| describe(InterfaceId(index), &device, default_input.as_ref(), default_output.as_ref()))
        .collect();

    debug!("Enumerated {} audio interfaces on {:?}", interfaces.len(), host.id());
    Ok(interfaces)
}

fn describe(id: InterfaceId, device: &Device, default_input: Option<&DeviceKey<DeviceId>>, default_output: Option<&DeviceKey<DeviceId>>) -> InterfaceDescriptor {
    let key = device_key(device);

    let input_configs = supported_configs(device, Direction::Input);
    let output_configs = supported_configs(device, Direction::Output);
    let input_channels = input_configs.iter().map(|c| c.channels()).max().unwrap_or(0);
    let output_channels = output_configs.iter().map(|c| c.channels()).max().unwrap_or(0);

    let default_input_config = device.default_input_config().ok();
    let default_output_config = device.default_output_config().ok();
    let default_config = default_output_config.as_ref().or(default_input_config.as_ref());

    let mut sample_rates: Vec<u32> = default_config.map(|c| c.sample_rate()).into_iter().collect();
    for rate in PROBED_SAMPLE_RATES {
        let supported = input_configs.iter().chain(&output_configs).any(|c| rate >= c.min_sample_rate() && rate <= c.max_sample_rate());
        if supported && !sample_rates.contains(&rate) {
            sample_rates.push(rate);
        }
    }

    if sample_rates.is_empty() {
        warn!("Could not determine any sample rate for interface {} ({})", id, key.name);
    }

    let (is_default_input, is_default_output) = default_flags(&key, input_channels, output_channels, default_input, default_output);

    InterfaceDescriptor {
        id,
        is_default_input,
        is_default_output,
        input_channels,
        output_channels,
        sample_rates,
        bit_depth: default_config.map(|c| (c.sample_format().sample_size() * 8) as u16),
        input_latency: latency_range(default_input_config.as_ref()),
        output_latency: latency_range(default_output_config.as_ref()),
        name: key.name,
    }
}

/// Convert a config's buffer size range (frames) to seconds.
fn latency_range(config: Option<&SupportedStreamConfig>) -> Option<(f64, f64)> {
    let config = config?;
    let rate = f64::from(config.sample_rate());
    match config.buffer_size() {
        SupportedBufferSize::Range { min, max } if rate > 0.0 => Some((f64::from(*min) / rate, f64::from(*max) / rate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: usize, default_input: bool, default_output: bool) -> InterfaceDescriptor {
        InterfaceDescriptor {
            id: InterfaceId(id),
            name: format!("Interface {}", id),
            is_default_input: default_input,
            is_default_output: default_output,
            input_channels: 2,
            output_channels: 2,
            sample_rates: vec![48000, 44100],
            bit_depth: Some(32),
            input_latency: Some((0.005, 0.02)),
            output_latency: None,
        }
    }

    #[test]
    fn test_default_lookup_checks_both_flags() {
        // One device can be default for both directions
        let interfaces = vec![descriptor(0, false, false), descriptor(1, true, true)];
        assert_eq!(default_input(&interfaces).map(|d| d.id), Some(InterfaceId(1)));
        assert_eq!(default_output(&interfaces).map(|d| d.id), Some(InterfaceId(1)));
    }

    #[test]
    fn test_default_lookup_separate_devices() {
        let interfaces = vec![descriptor(0, true, false), descriptor(1, false, true)];
        assert_eq!(default_input(&interfaces).map(|d| d.id), Some(InterfaceId(0)));
        assert_eq!(default_output(&interfaces).map(|d| d.id), Some(InterfaceId(1)));
        assert!(find(&interfaces, InterfaceId(7)).is_none());
    }

    fn key(id: Option<u32>, name: &str) -> DeviceKey<u32> {
        DeviceKey { id, name: name.to_string() }
    }

    #[test]
    fn test_default_flags_use_ids_for_identical_names() {
        let default = key(Some(3), "USB Audio CODEC");
        let first = key(Some(1), "USB Audio CODEC");
        let third = key(Some(3), "USB Audio CODEC");

        assert_eq!(default_flags(&first, 2, 2, Some(&default), Some(&default)), (false, false));
        assert_eq!(default_flags(&third, 2, 2, Some(&default), Some(&default)), (true, true));
    }

    #[test]
    fn test_default_flags_checked_independently() {
        let mic = key(Some(1), "Mic");
        let speakers = key(Some(2), "Speakers");

        assert_eq!(default_flags(&mic, 1, 0, Some(&mic), Some(&speakers)), (true, false));
        assert_eq!(default_flags(&speakers, 0, 2, Some(&mic), Some(&speakers)), (false, true));
        // Output default is still found when there is no default input
        assert_eq!(default_flags(&speakers, 0, 2, None, Some(&speakers)), (false, true));
        // No channels on a side means no default flag on that side
        assert_eq!(default_flags(&mic, 0, 2, Some(&mic), Some(&mic)), (false, true));
    }

    #[test]
    fn test_default_flags_fall_back_to_names_without_ids() {
        let default = key(None, "Built-in Audio");
        assert_eq!(default_flags(&key(Some(4), "Built-in Audio"), 2, 2, Some(&default), None), (true, false));
        assert_eq!(default_flags(&key(None, "HDMI"), 2, 2, Some(&default), None), (false, false));
    }

    #[test]
    fn test_select_explicit_and_default() {
        let mut output_only = descriptor(2, false, false);
        output_only.input_channels = 0;
        let interfaces = vec![descriptor(0, false, true), descriptor(1, true, false), output_only];

        assert_eq!(select(&interfaces, None, Direction::Input).unwrap().id, InterfaceId(1));
        assert_eq!(select(&interfaces, None, Direction::Output).unwrap().id, InterfaceId(0));
        assert_eq!(select(&interfaces, Some(InterfaceId(2)), Direction::Output).unwrap().id, InterfaceId(2));

        let err = select(&interfaces, Some(InterfaceId(2)), Direction::Input).unwrap_err();
        assert_eq!(err.direction(), Some(Direction::Input));
        assert!(matches!(select(&interfaces, Some(InterfaceId(9)), Direction::Output), Err(AudioError::DeviceOpen { .. })));
        assert!(select(&[], None, Direction::Input).is_err());
    }

    #[test]
    fn test_descriptor_serializes_to_json() {
        let json = serde_json::to_value(descriptor(3, true, false)).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["sample_rates"][0], 48000);
        assert!(json["output_latency"].is_null());
    }
}
