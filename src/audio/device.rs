//! Audio device enumeration
//!
//! Devices are addressed by integer ids: the 1-based position of the device
//! in the host's input (or output) enumeration. Id `0` means the host's
//! default device.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio::stream::Direction;
use crate::constants::UNSPECIFIED_DEVICE_ID;
use crate::error::AudioError;

/// Description of one device as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDeviceInfo {
    pub id: i32,
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List input and output devices of the default host
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for (index, device) in inputs.enumerate() {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = device_capabilities(&device, Direction::Input);
                devices.push(AudioDeviceInfo {
                    id: index as i32 + 1,
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    direction: Direction::Input,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for (index, device) in outputs.enumerate() {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = device_capabilities(&device, Direction::Output);
                devices.push(AudioDeviceInfo {
                    id: index as i32 + 1,
                    is_default: default_output_name.as_ref() == Some(&name),
                    name,
                    direction: Direction::Output,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Common sample rates and channel counts a device supports
fn device_capabilities(device: &cpal::Device, direction: Direction) -> (Vec<u32>, Vec<u16>) {
    let configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default(),
        Direction::Output => device
            .supported_output_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default(),
    };

    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();
    for config in &configs {
        for rate_val in [44100u32, 48000, 88200, 96000, 176400, 192000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !sample_rates.contains(&rate_val)
            {
                sample_rates.push(rate_val);
            }
        }
        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Resolve a device id to a cpal device
pub fn find_device(direction: Direction, id: i32) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if id == UNSPECIFIED_DEVICE_ID {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceNotFound(format!("No default {:?} device", direction).to_lowercase())
        });
    }

    let index = usize::try_from(id)
        .ok()
        .and_then(|id| id.checked_sub(1))
        .ok_or_else(|| AudioError::DeviceNotFound(format!("invalid device id {}", id)))?;

    let device = match direction {
        Direction::Input => host
            .input_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .nth(index),
        Direction::Output => host
            .output_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .nth(index),
    };

    device.ok_or_else(|| AudioError::DeviceNotFound(format!("{:?} device {}", direction, id)))
}
