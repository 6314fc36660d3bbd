//! Pluggable audio backend.
//!
//! [`AudioBackend`] hides the platform audio API behind boxed closures so a
//! host can pick a backend at runtime. [`CpalBackend`](crate::CpalBackend) is
//! the default; tests substitute their own.
//!
//! ```text
//!  AudioDeviceCallback ──▶ InterleavedDriver ──▶ OutputCallback ──▶ AudioBackend
//!     (planar, e.g.           (chunking,            (interleaved       (cpal, mock)
//!      GraphPlayer)            scratch)              f32 slice)
//! ```

use crate::{AudioDevice, AudioDeviceCallback, InterleavedDriver, Result};

/// Parameters for opening an output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred hardware buffer size in frames.
    pub buffer_size: u32,
    /// Output channel count.
    pub channels: u16,
    /// Device name filter. `None` opens the system default.
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            device_name: None,
        }
    }
}

/// Keeps a backend stream alive. Dropping it stops playback.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wraps a backend-specific stream object.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Fills an interleaved `[L0, R0, L1, R1, ...]` buffer on the audio thread.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Receives a human-readable streaming error.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Platform audio API.
pub trait AudioBackend: Send {
    /// Backend name, e.g. "cpal".
    fn name(&self) -> &str;

    /// All devices the backend can see.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// Opens and starts an output stream that calls `callback` per hardware
    /// buffer.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Rate the backend will actually run at for `config`.
    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        config.sample_rate
    }
}

/// Starts `callback` on an output stream of `backend`.
///
/// The callback is prepared before the stream opens and released when the
/// returned handle drops. Device input is not captured; graph input nodes
/// read silence.
pub fn start_output<C>(
    backend: &dyn AudioBackend,
    config: &BackendStreamConfig,
    callback: C,
) -> Result<StreamHandle>
where
    C: AudioDeviceCallback + 'static,
{
    let sample_rate = backend.actual_sample_rate(config);
    let mut driver = InterleavedDriver::new(
        callback,
        f64::from(sample_rate),
        config.buffer_size as usize,
        0,
        usize::from(config.channels),
    );
    tracing::info!(
        backend = backend.name(),
        sample_rate,
        channels = config.channels,
        buffer_size = config.buffer_size,
        "starting output"
    );
    backend.build_output_stream(
        config,
        Box::new(move |data: &mut [f32]| driver.render(data)),
        Box::new(|err| tracing::error!(error = err, "audio stream error")),
    )
}
