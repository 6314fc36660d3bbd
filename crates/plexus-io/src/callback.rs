//! The device-facing callback contract and its interleaving adapter.

use crate::AudioBuffer;

/// Something a device drives once per hardware cycle.
///
/// `prepare` runs before the first cycle and `release` after the last. Both
/// may allocate. `process` runs on the audio thread and must not.
pub trait AudioDeviceCallback: Send {
    /// The stream is about to start at `sample_rate`, delivering at most
    /// `max_frames` frames per cycle.
    fn prepare(&mut self, sample_rate: f64, max_frames: usize);

    /// Renders `frames` frames. `outputs` arrives zeroed.
    fn process(&mut self, inputs: &AudioBuffer, outputs: &mut AudioBuffer, frames: usize);

    /// The stream has stopped.
    fn release(&mut self) {}
}

impl<C: AudioDeviceCallback + ?Sized> AudioDeviceCallback for Box<C> {
    fn prepare(&mut self, sample_rate: f64, max_frames: usize) {
        (**self).prepare(sample_rate, max_frames);
    }

    fn process(&mut self, inputs: &AudioBuffer, outputs: &mut AudioBuffer, frames: usize) {
        (**self).process(inputs, outputs, frames);
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// Adapts an [`AudioDeviceCallback`] to a backend's interleaved buffers.
///
/// Hardware buffers larger than the prepared size are rendered in pieces.
/// The wrapped callback is released when the driver is dropped.
pub struct InterleavedDriver<C: AudioDeviceCallback> {
    callback: C,
    inputs: AudioBuffer,
    outputs: AudioBuffer,
    input_channels: usize,
    output_channels: usize,
}

impl<C: AudioDeviceCallback> InterleavedDriver<C> {
    /// Prepares `callback` and allocates scratch for `max_frames` frames.
    pub fn new(
        mut callback: C,
        sample_rate: f64,
        max_frames: usize,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        let max_frames = max_frames.max(1);
        callback.prepare(sample_rate, max_frames);
        Self {
            callback,
            inputs: AudioBuffer::new(input_channels, max_frames),
            outputs: AudioBuffer::new(output_channels, max_frames),
            input_channels,
            output_channels,
        }
    }

    /// Output channel count.
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Renders into interleaved `output`, with no device input.
    pub fn render(&mut self, output: &mut [f32]) {
        self.render_duplex(&[], output);
    }

    /// Renders into interleaved `output`, reading interleaved `input` with
    /// the same frame count. Missing input reads as silence.
    pub fn render_duplex(&mut self, input: &[f32], output: &mut [f32]) {
        if self.output_channels == 0 {
            output.fill(0.0);
            return;
        }
        let chunk_frames = self.outputs.frames();
        let mut frame_offset = 0;
        for chunk in output.chunks_mut(chunk_frames * self.output_channels) {
            let frames = chunk.len() / self.output_channels;
            let start = frame_offset * self.input_channels;
            let in_chunk = input.get(start..).unwrap_or(&[]);
            self.inputs.read_interleaved(in_chunk, self.input_channels, frames);
            self.outputs.clear();
            self.callback.process(&self.inputs, &mut self.outputs, frames);
            self.outputs.write_interleaved(chunk, self.output_channels, frames);
            frame_offset += frames;
        }
    }
}

impl<C: AudioDeviceCallback> Drop for InterleavedDriver<C> {
    fn drop(&mut self) {
        self.callback.release();
    }
}
