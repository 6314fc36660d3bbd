//! Drives a published graph from the device callback.

use plexus_core::{
    CompiledGraphReader, EventBuffer, GraphIo, MidiCollector, MidiSender, ProcessContext,
    midi_collector,
};

use crate::{AudioBuffer, AudioDeviceCallback};

/// Renders whatever graph is currently published, in sub-blocks no longer
/// than both the player's and the graph's block size.
///
/// With no published graph the outputs stay silent. MIDI queued through the
/// [`MidiSender`] returned by [`GraphPlayer::new`] is delivered at the start
/// of the next device cycle.
pub struct GraphPlayer {
    reader: CompiledGraphReader,
    midi: MidiCollector,
    midi_buffer: EventBuffer,
    block_size: usize,
    sample_rate: f64,
}

impl GraphPlayer {
    /// A player over `reader`, plus the sender for its MIDI input.
    pub fn new(
        reader: CompiledGraphReader,
        block_size: usize,
        midi_capacity: usize,
    ) -> (Self, MidiSender) {
        let (sender, midi) = midi_collector(midi_capacity);
        let player = Self {
            reader,
            midi,
            midi_buffer: EventBuffer::with_capacity(midi_capacity),
            block_size: block_size.max(1),
            sample_rate: 0.0,
        };
        (player, sender)
    }

    /// Largest sub-block handed to the graph.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Rate passed to the last `prepare`, or 0 before the stream starts.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl AudioDeviceCallback for GraphPlayer {
    fn prepare(&mut self, sample_rate: f64, max_frames: usize) {
        self.sample_rate = sample_rate;
        tracing::debug!(
            sample_rate,
            max_frames,
            block_size = self.block_size,
            "graph player prepared"
        );
    }

    fn process(&mut self, inputs: &AudioBuffer, outputs: &mut AudioBuffer, frames: usize) {
        outputs.clear();
        self.midi_buffer.clear();
        self.midi.drain_into(&mut self.midi_buffer);

        let guard = self.reader.load();
        let Some(graph) = guard.as_ref() else {
            return;
        };

        let block_size = self.block_size.min(graph.block_size().max(1));
        let mut start = 0;
        while start < frames {
            let count = (frames - start).min(block_size);
            let mut io = DeviceIo {
                inputs,
                outputs: &mut *outputs,
                midi: (start == 0).then_some(&self.midi_buffer),
                offset: start,
                frames: count,
            };
            graph.process(&ProcessContext::new(start, count), &mut io);
            start += count;
        }
    }

    fn release(&mut self) {
        tracing::debug!("graph player released");
    }
}

/// One sub-block's window onto the device buffers.
struct DeviceIo<'a> {
    inputs: &'a AudioBuffer,
    outputs: &'a mut AudioBuffer,
    midi: Option<&'a EventBuffer>,
    offset: usize,
    frames: usize,
}

impl GraphIo for DeviceIo<'_> {
    fn audio_input(&mut self, channel: usize, dest: &mut [f32]) {
        let n = dest.len().min(self.frames);
        let source = (channel < self.inputs.num_channels())
            .then(|| self.inputs.channel(channel).get(self.offset..self.offset + n))
            .flatten();
        match source {
            Some(source) => dest[..n].copy_from_slice(source),
            None => dest[..n].fill(0.0),
        }
    }

    fn audio_output(&mut self, channel: usize, source: &[f32]) {
        if channel >= self.outputs.num_channels() {
            return;
        }
        let n = source.len().min(self.frames);
        let Some(dest) = self
            .outputs
            .channel_mut(channel)
            .get_mut(self.offset..self.offset + n)
        else {
            return;
        };
        for (d, s) in dest.iter_mut().zip(source) {
            *d += s;
        }
    }

    fn midi_input(&mut self, dest: &mut EventBuffer) {
        if let Some(events) = self.midi {
            dest.extend_from(events);
        }
    }
}
