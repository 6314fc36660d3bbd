//! Engine settings stored as TOML.
//!
//! ```toml
//! sample_rate = 48000
//! block_size = 512
//! work_buffer_size = 8192
//!
//! [device]
//! output = "USB"
//! channels = 2
//! ```

use std::path::Path;

use plexus_core::{MAX_CHANNELS, ModuleConfig};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Audio device selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Output device name filter. `None` uses the system default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Input device name filter. `None` uses the system default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Output channel count.
    pub channels: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            output: None,
            input: None,
            channels: 2,
        }
    }
}

/// Sizes and rates the engine is built with. Missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Largest block rendered per graph pass, in frames.
    pub block_size: usize,
    /// Request ring of the shared work thread, in bytes.
    pub work_buffer_size: usize,
    /// Per-plugin worker response ring, in bytes.
    pub worker_response_size: usize,
    /// Per-plugin UI-to-audio event ring, in bytes.
    pub event_buffer_size: usize,
    /// Per-plugin audio-to-UI notification ring, in bytes.
    pub notification_buffer_size: usize,
    /// Events each sequence port holds per block.
    pub event_capacity: usize,
    /// Rate at which the UI drains notifications, in Hz.
    pub ui_timer_hz: u32,
    /// Device MIDI events queued between cycles.
    pub midi_buffer_capacity: usize,
    /// Device selection.
    pub device: DeviceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let module = ModuleConfig::default();
        Self {
            sample_rate: module.sample_rate as u32,
            block_size: module.block_size,
            work_buffer_size: plexus_core::graph::DEFAULT_WORK_BUFFER_SIZE,
            worker_response_size: module.worker_response_size,
            event_buffer_size: module.event_buffer_size,
            notification_buffer_size: module.notification_buffer_size,
            event_capacity: module.event_capacity,
            ui_timer_hz: 30,
            midi_buffer_capacity: 256,
            device: DeviceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Reads the file at `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses and validates TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes TOML to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=384_000).contains(&self.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("{} Hz is outside 8000..=384000", self.sample_rate),
            ));
        }
        if self.block_size == 0 || self.block_size > 8192 {
            return Err(ConfigError::invalid(
                "block_size",
                format!("{} frames is outside 1..=8192", self.block_size),
            ));
        }
        let rings = [
            ("work_buffer_size", self.work_buffer_size),
            ("worker_response_size", self.worker_response_size),
            ("event_buffer_size", self.event_buffer_size),
            ("notification_buffer_size", self.notification_buffer_size),
        ];
        for (field, size) in rings {
            // Room for at least one header plus a small payload.
            if size < 64 {
                return Err(ConfigError::invalid(field, format!("{size} bytes is below 64")));
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be non-zero"));
        }
        if self.midi_buffer_capacity == 0 {
            return Err(ConfigError::invalid("midi_buffer_capacity", "must be non-zero"));
        }
        if self.ui_timer_hz == 0 {
            return Err(ConfigError::invalid("ui_timer_hz", "must be non-zero"));
        }
        if self.device.channels == 0 {
            return Err(ConfigError::invalid("device.channels", "must be non-zero"));
        }
        if u32::from(self.device.channels) > MAX_CHANNELS {
            return Err(ConfigError::invalid(
                "device.channels",
                format!("{} is above {MAX_CHANNELS}", self.device.channels),
            ));
        }
        Ok(())
    }

    /// Per-plugin sizes for the engine graph.
    pub fn module_config(&self) -> ModuleConfig {
        ModuleConfig {
            sample_rate: f64::from(self.sample_rate),
            block_size: self.block_size,
            event_buffer_size: self.event_buffer_size,
            notification_buffer_size: self.notification_buffer_size,
            worker_response_size: self.worker_response_size,
            event_capacity: self.event_capacity,
        }
    }

    /// Interval between UI timer ticks.
    pub fn ui_timer_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.ui_timer_hz.max(1)))
    }
}
