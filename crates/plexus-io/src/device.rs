//! Audio device discovery.

use crate::{Error, Result};
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

/// Sample rate reported when a device has no default configuration.
const FALLBACK_SAMPLE_RATE: u32 = 48000;

/// Device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// A device the host can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device captures audio.
    pub is_input: bool,
    /// Whether the device plays audio.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default output channel count, or 0 for capture-only devices.
    pub output_channels: u16,
}

fn describe(device: &Device, is_input: bool) -> Option<AudioDevice> {
    let name = device_name(device).ok()?;
    let output = device.default_output_config().ok();
    let sample_rate = if is_input {
        device.default_input_config().ok().map(|c| c.sample_rate())
    } else {
        output.as_ref().map(|c| c.sample_rate())
    };
    Some(AudioDevice {
        name,
        is_input,
        is_output: output.is_some(),
        default_sample_rate: sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE),
        output_channels: output.map(|c| c.channels()).unwrap_or(0),
    })
}

/// All devices on the default host. Devices that both capture and play are
/// listed once.
pub fn list_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDevice> = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        devices.extend(inputs.filter_map(|d| describe(&d, true)));
    }
    if let Ok(outputs) = host.output_devices() {
        for device in outputs.filter_map(|d| describe(&d, false)) {
            if !devices.iter().any(|d| d.name == device.name) {
                devices.push(device);
            }
        }
    }

    tracing::debug!(count = devices.len(), "enumerated audio devices");
    Ok(devices)
}

/// The host's default output device, if any.
pub fn default_output_device() -> Option<AudioDevice> {
    let device = cpal::default_host().default_output_device()?;
    describe(&device, false)
}

/// First output device whose name contains `search`, ignoring case.
pub fn find_output_device(search: &str) -> Result<AudioDevice> {
    let search_lower = search.to_lowercase();
    list_devices()?
        .into_iter()
        .find(|d| d.is_output && d.name.to_lowercase().contains(&search_lower))
        .ok_or_else(|| Error::DeviceNotFound(format!("no output device matching '{search}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // Availability depends on the machine; enumeration itself must not fail.
        assert!(list_devices().is_ok());
    }

    #[test]
    fn test_find_missing_device() {
        let err = find_output_device("plexus-no-such-device-\u{1f50a}").unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }
}
