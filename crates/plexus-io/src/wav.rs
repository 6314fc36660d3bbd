//! Multichannel WAV files as planar [`AudioBuffer`]s.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};

use crate::{AudioBuffer, Error, Result};

/// WAV stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample. 32 is written as float, anything else as integer PCM.
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Header summary of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    /// Stream format.
    pub spec: WavSpec,
    /// Frames per channel.
    pub num_frames: u64,
    /// Length in seconds.
    pub duration_secs: f64,
}

/// Reads the header only.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let num_frames = u64::from(reader.len()) / u64::from(spec.channels.max(1));
    Ok(WavInfo {
        spec,
        num_frames,
        duration_secs: num_frames as f64 / f64::from(spec.sample_rate),
    })
}

/// Reads every channel of a WAV file, scaled to [-1, 1).
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(AudioBuffer, WavSpec)> {
    let reader = WavReader::open(path)?;
    let hound_spec = reader.spec();
    let spec = WavSpec::from(hound_spec);
    let channels = usize::from(spec.channels);
    if channels == 0 {
        return Err(Error::UnsupportedFormat("zero channels".into()));
    }

    let interleaved: Vec<f32> = match hound_spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(Error::UnsupportedFormat(format!(
                    "{}-bit integer PCM",
                    spec.bits_per_sample
                )));
            }
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let frames = interleaved.len() / channels;
    let mut buffer = AudioBuffer::new(channels, frames);
    buffer.read_interleaved(&interleaved, channels, frames);
    Ok((buffer, spec))
}

/// Writes `buffer` using `spec`'s rate and bit depth. The channel count comes
/// from the buffer.
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &AudioBuffer, spec: WavSpec) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        ..spec
    };
    if spec.channels == 0 {
        return Err(Error::UnsupportedFormat("zero channels".into()));
    }
    let mut writer = WavWriter::create(path, hound::WavSpec::from(spec))?;

    let mut interleaved = vec![0.0; buffer.frames() * buffer.num_channels()];
    buffer.write_interleaved(&mut interleaved, buffer.num_channels(), buffer.frames());

    if spec.bits_per_sample == 32 {
        for sample in interleaved {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
        for sample in interleaved {
            writer.write_sample((sample * max_val).clamp(-max_val, max_val - 1.0) as i32)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
