//! [cpal](https://crates.io/crates/cpal) implementation of [`AudioBackend`].
//!
//! ALSA on Linux, CoreAudio on macOS, WASAPI on Windows.

use cpal::Host;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::backend::{
    AudioBackend, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle,
};
use crate::device::device_name;
use crate::{AudioDevice, Error, Result};

/// Backend over the platform's default cpal host.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Connects to the default host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    fn find_output_device(&self, name: Option<&str>) -> Result<cpal::Device> {
        let Some(search) = name else {
            return self.host.default_output_device().ok_or(Error::NoDevice);
        };
        let search_lower = search.to_lowercase();
        self.host
            .output_devices()
            .map_err(|e| Error::Stream(e.to_string()))?
            .find(|device| {
                device_name(device)
                    .is_ok_and(|name| name.to_lowercase().contains(&search_lower))
            })
            .ok_or_else(|| Error::DeviceNotFound(format!("no output device matching '{search}'")))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        crate::device::list_devices()
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(crate::device::default_output_device())
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_output_device(config.device_name.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                move |err| error_callback(&err.to_string()),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            "output stream started"
        );

        Ok(StreamHandle::new(stream))
    }
}
