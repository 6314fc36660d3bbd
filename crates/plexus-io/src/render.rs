//! Offline rendering: drive a device callback from a buffer instead of hardware.

use crate::{AudioBuffer, AudioDeviceCallback};

/// Pulls audio through a callback in fixed-size cycles, as a device would.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineRenderer {
    /// Sample rate reported to the callback.
    pub sample_rate: f64,
    /// Frames per cycle.
    pub block_size: usize,
    /// Width of the rendered output.
    pub output_channels: usize,
}

impl OfflineRenderer {
    /// A renderer with the given rate, cycle size and output width.
    pub fn new(sample_rate: f64, block_size: usize, output_channels: usize) -> Self {
        Self {
            sample_rate,
            block_size: block_size.max(1),
            output_channels,
        }
    }

    /// Renders `frames` frames, feeding `input` as device input. Input
    /// shorter than `frames` is extended with silence.
    ///
    /// The callback is prepared before the first cycle and released after
    /// the last.
    pub fn render<C>(&self, callback: &mut C, input: &AudioBuffer, frames: usize) -> AudioBuffer
    where
        C: AudioDeviceCallback + ?Sized,
    {
        let block_size = self.block_size.max(1);
        let mut output = AudioBuffer::new(self.output_channels, frames);
        let mut in_block = AudioBuffer::new(input.num_channels(), block_size);
        let mut out_block = AudioBuffer::new(self.output_channels, block_size);

        callback.prepare(self.sample_rate, block_size);
        tracing::debug!(frames, block_size, "offline render");

        let mut start = 0;
        while start < frames {
            let count = (frames - start).min(block_size);
            for ch in 0..input.num_channels() {
                let dest = &mut in_block.channel_mut(ch)[..count];
                let source = input.channel(ch).get(start..).unwrap_or(&[]);
                let n = source.len().min(count);
                dest[..n].copy_from_slice(&source[..n]);
                dest[n..].fill(0.0);
            }
            out_block.clear();
            callback.process(&in_block, &mut out_block, count);
            for ch in 0..self.output_channels {
                output.channel_mut(ch)[start..start + count]
                    .copy_from_slice(&out_block.channel(ch)[..count]);
            }
            start += count;
        }

        callback.release();
        output
    }
}
