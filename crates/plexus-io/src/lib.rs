//! Device side of the Plexus host.
//!
//! - **Callback contract**: [`AudioDeviceCallback`] receives planar
//!   [`AudioBuffer`]s; [`InterleavedDriver`] adapts it to interleaved
//!   hardware buffers
//! - **Graph playback**: [`GraphPlayer`] renders the published graph from the
//!   device callback, in sub-blocks no larger than the graph's block size
//! - **Backends**: [`AudioBackend`] with [`CpalBackend`] as the default, and
//!   [`start_output`] to run a callback on one
//! - **Offline**: [`OfflineRenderer`] plus multichannel [`read_wav`] /
//!   [`write_wav`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plexus_core::{EngineGraph, ModuleConfig};
//! use plexus_io::{BackendStreamConfig, CpalBackend, GraphPlayer, start_output};
//!
//! let mut graph = EngineGraph::new(ModuleConfig::default(), 8192)?;
//! // ... add nodes, connect, compile ...
//! let (player, midi) = GraphPlayer::new(graph.reader(), 512, 256);
//! let _stream = start_output(&CpalBackend::new(), &BackendStreamConfig::default(), player)?;
//! ```

pub mod backend;
mod buffer;
mod callback;
pub mod cpal_backend;
mod device;
mod player;
mod render;
mod wav;

pub use backend::{
    AudioBackend, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle, start_output,
};
pub use buffer::AudioBuffer;
pub use callback::{AudioDeviceCallback, InterleavedDriver};
pub use cpal_backend::CpalBackend;
pub use device::{AudioDevice, default_output_device, find_output_device, list_devices};
pub use player::GraphPlayer;
pub use render::OfflineRenderer;
pub use wav::{WavInfo, WavSpec, read_wav, read_wav_info, write_wav};

/// Errors from devices and audio files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV read or write failed.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Stream setup or runtime failure.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// The host has no audio device.
    #[error("No audio device available")]
    NoDevice,

    /// The file or stream format cannot be handled.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No device matched the requested name.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
