//! Planar sample buffers passed across the device callback.

/// Non-interleaved audio: one `Vec<f32>` per channel, all the same length.
///
/// Storage is sized up front so the audio thread never reallocates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// `channels` silent channels of `frames` samples each.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Wraps existing channel data. Shorter channels are zero-padded to the
    /// longest one.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self { channels, frames }
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of every channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Samples of channel `index`.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutable samples of channel `index`.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// All channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Consumes the buffer, returning its channels.
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Zeroes every sample.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Fills the first `frames` frames from interleaved `source`. Channels beyond
    /// the source's width are zeroed; extra source channels are dropped.
    pub fn read_interleaved(&mut self, source: &[f32], source_channels: usize, frames: usize) {
        let frames = frames.min(self.frames);
        for (ch, channel) in self.channels.iter_mut().enumerate() {
            if ch >= source_channels {
                channel[..frames].fill(0.0);
                continue;
            }
            for (i, sample) in channel[..frames].iter_mut().enumerate() {
                *sample = source.get(i * source_channels + ch).copied().unwrap_or(0.0);
            }
        }
    }

    /// Writes `frames` frames into interleaved `dest` with `dest_channels`
    /// slots per frame. Slots without a matching channel are zeroed.
    pub fn write_interleaved(&self, dest: &mut [f32], dest_channels: usize, frames: usize) {
        if dest_channels == 0 {
            return;
        }
        for (i, frame) in dest.chunks_mut(dest_channels).take(frames).enumerate() {
            for (ch, slot) in frame.iter_mut().enumerate() {
                *slot = self
                    .channels
                    .get(ch)
                    .and_then(|c| c.get(i))
                    .copied()
                    .unwrap_or(0.0);
            }
        }
    }
}
