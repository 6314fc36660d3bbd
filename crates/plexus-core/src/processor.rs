//! The capability set every hosted plugin implements.
//!
//! A [`Processor`] describes its ports and renders one block at a time into
//! [`PortBuffers`] owned by the host. Concrete plugin formats (the internal I/O
//! nodes, or a bridge to a third-party plugin standard) are all just
//! implementations of this trait.

use crate::midi::EventBuffer;
use crate::port::{PortRange, PortType};
use crate::work::{Worker, WorkerHandle};

/// Position of one render call inside the device block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessContext {
    /// First device frame covered.
    pub start_frame: usize,
    /// One past the last device frame covered.
    pub end_frame: usize,
    /// `end_frame - start_frame`.
    pub frame_count: usize,
}

impl ProcessContext {
    /// Context covering `frame_count` frames from `start_frame`.
    pub fn new(start_frame: usize, frame_count: usize) -> Self {
        Self {
            start_frame,
            end_frame: start_frame + frame_count,
            frame_count,
        }
    }
}

/// What a [`Processor`] may do during [`run`](Processor::run) besides touching its ports.
pub struct RunContext<'a> {
    /// Frames to render, never more than the activated block size.
    pub frames: usize,
    /// Placement inside the device block.
    pub process: ProcessContext,
    worker: Option<&'a WorkerHandle>,
}

impl<'a> RunContext<'a> {
    /// Creates a context. `worker` is the processor's deferred-work channel, if any.
    pub fn new(process: ProcessContext, worker: Option<&'a WorkerHandle>) -> Self {
        Self {
            frames: process.frame_count,
            process,
            worker,
        }
    }

    /// Queues deferred work. Returns `false` if the processor has no worker or
    /// the request could not be queued this cycle.
    pub fn schedule_work(&self, data: &[u8]) -> bool {
        self.worker.is_some_and(|w| w.schedule_work(data))
    }

    /// Whether deferred work can be scheduled at all.
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }
}

/// Storage behind one port.
#[derive(Clone, Debug)]
pub enum PortBuffer {
    /// Audio and CV ports: one float per frame, sized to the block size.
    Audio(Vec<f32>),
    /// Control ports.
    Control(f32),
    /// Atom, Event and MIDI ports.
    Events(EventBuffer),
    /// Ports of unknown type.
    Unused,
}

/// Buffers for every port of one processor, indexed by port index.
#[derive(Clone, Debug, Default)]
pub struct PortBuffers {
    ports: Vec<PortBuffer>,
}

impl PortBuffers {
    /// Allocates a buffer per port type. Audio buffers hold `block_size` frames,
    /// event buffers hold `event_capacity` events.
    pub fn new(types: &[PortType], block_size: usize, event_capacity: usize) -> Self {
        let ports = types
            .iter()
            .map(|t| match t {
                PortType::Audio | PortType::Cv => PortBuffer::Audio(vec![0.0; block_size]),
                PortType::Control => PortBuffer::Control(0.0),
                PortType::Atom | PortType::Event | PortType::Midi => {
                    PortBuffer::Events(EventBuffer::with_capacity(event_capacity))
                }
                PortType::Unknown => PortBuffer::Unused,
            })
            .collect();
        Self { ports }
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether there are no ports.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Raw access to one port's buffer.
    pub fn get(&self, port: u32) -> Option<&PortBuffer> {
        self.ports.get(port as usize)
    }

    /// Audio samples of `port`. Empty if the port is not audio-rate.
    pub fn audio(&self, port: u32) -> &[f32] {
        match self.ports.get(port as usize) {
            Some(PortBuffer::Audio(buf)) => buf,
            _ => &[],
        }
    }

    /// Mutable audio samples of `port`. Empty if the port is not audio-rate.
    pub fn audio_mut(&mut self, port: u32) -> &mut [f32] {
        match self.ports.get_mut(port as usize) {
            Some(PortBuffer::Audio(buf)) => buf,
            _ => &mut [],
        }
    }

    /// An input and an output audio buffer at once.
    ///
    /// `None` if the ports are equal, out of range, or not audio-rate.
    pub fn audio_in_out(&mut self, input: u32, output: u32) -> Option<(&[f32], &mut [f32])> {
        let (i, o) = (input as usize, output as usize);
        if i == o || i >= self.ports.len() || o >= self.ports.len() {
            return None;
        }
        let (src, dst) = if i < o {
            let (head, tail) = self.ports.split_at_mut(o);
            (&head[i], &mut tail[0])
        } else {
            let (head, tail) = self.ports.split_at_mut(i);
            (&tail[0], &mut head[o])
        };
        match (src, dst) {
            (PortBuffer::Audio(a), PortBuffer::Audio(b)) => Some((a.as_slice(), b.as_mut_slice())),
            _ => None,
        }
    }

    /// Value of a control port, 0 for anything else.
    pub fn control(&self, port: u32) -> f32 {
        match self.ports.get(port as usize) {
            Some(PortBuffer::Control(v)) => *v,
            _ => 0.0,
        }
    }

    /// Sets a control port. Ignored for other port types.
    pub fn set_control(&mut self, port: u32, value: f32) {
        if let Some(PortBuffer::Control(v)) = self.ports.get_mut(port as usize) {
            *v = value;
        }
    }

    /// Event sequence of `port`, if it is a sequence port.
    pub fn events(&self, port: u32) -> Option<&EventBuffer> {
        match self.ports.get(port as usize) {
            Some(PortBuffer::Events(buf)) => Some(buf),
            _ => None,
        }
    }

    /// Mutable event sequence of `port`, if it is a sequence port.
    pub fn events_mut(&mut self, port: u32) -> Option<&mut EventBuffer> {
        match self.ports.get_mut(port as usize) {
            Some(PortBuffer::Events(buf)) => Some(buf),
            _ => None,
        }
    }
}

/// A hosted plugin instance.
///
/// Port layout queries must return the same answers for the lifetime of the
/// instance. `run` is called on the realtime thread and must not block or
/// allocate.
pub trait Processor: Send {
    /// Number of ports.
    fn num_ports(&self) -> u32;

    /// Type of port `index`.
    fn port_type(&self, index: u32) -> PortType;

    /// Whether port `index` is an input.
    fn is_port_input(&self, index: u32) -> bool;

    /// Machine identifier of port `index`.
    fn port_symbol(&self, index: u32) -> String {
        format!("port_{index}")
    }

    /// Display name of port `index`.
    fn port_name(&self, index: u32) -> String {
        self.port_symbol(index)
    }

    /// Range of control port `index`.
    fn port_range(&self, _index: u32) -> PortRange {
        PortRange::default()
    }

    /// Prepares for rendering at `sample_rate` with blocks of at most `max_block_size` frames.
    fn activate(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    /// Stops rendering. Called before re-activation or removal.
    fn deactivate(&mut self) {}

    /// Renders one block.
    fn run(&mut self, ports: &mut PortBuffers, context: &mut RunContext<'_>);

    /// Gives the host this instance's background worker, if it has one.
    ///
    /// Called once at instantiation.
    fn take_worker(&mut self) -> Option<Box<dyn Worker>> {
        None
    }

    /// Receives one response from the background worker. Called on the
    /// realtime thread before `run`.
    fn work_response(&mut self, _data: &[u8]) {}

    /// Called after every `run`.
    fn end_run(&mut self) {}

    /// Opaque state blob. Control port values are saved by the host.
    fn save_state(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Restores a blob produced by [`save_state`](Self::save_state).
    fn restore_state(&mut self, _data: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_by_type() {
        let types = [
            PortType::Audio,
            PortType::Control,
            PortType::Midi,
            PortType::Cv,
            PortType::Unknown,
        ];
        let mut bufs = PortBuffers::new(&types, 64, 16);
        assert_eq!(bufs.len(), 5);
        assert_eq!(bufs.audio(0).len(), 64);
        assert_eq!(bufs.audio(3).len(), 64);
        assert!(bufs.audio(1).is_empty());
        assert!(bufs.events(2).is_some());
        assert!(bufs.events(0).is_none());
        assert!(matches!(bufs.get(4), Some(PortBuffer::Unused)));

        bufs.set_control(1, 0.5);
        bufs.set_control(0, 0.5);
        assert_eq!(bufs.control(1), 0.5);
        assert_eq!(bufs.control(0), 0.0);
    }

    #[test]
    fn test_audio_in_out_both_orders() {
        let types = [PortType::Audio, PortType::Audio, PortType::Control];
        let mut bufs = PortBuffers::new(&types, 4, 0);
        bufs.audio_mut(0).fill(1.0);

        let (input, output) = bufs.audio_in_out(0, 1).unwrap();
        output.copy_from_slice(input);
        assert_eq!(bufs.audio(1), &[1.0; 4]);

        let (input, output) = bufs.audio_in_out(1, 0).unwrap();
        for (o, i) in output.iter_mut().zip(input) {
            *o = i * 2.0;
        }
        assert_eq!(bufs.audio(0), &[2.0; 4]);

        assert!(bufs.audio_in_out(0, 0).is_none());
        assert!(bufs.audio_in_out(0, 2).is_none());
        assert!(bufs.audio_in_out(0, 9).is_none());
    }

    #[test]
    fn test_context_without_worker() {
        let ctx = RunContext::new(ProcessContext::new(32, 16), None);
        assert_eq!(ctx.frames, 16);
        assert_eq!(ctx.process.end_frame, 48);
        assert!(!ctx.has_worker());
        assert!(!ctx.schedule_work(b"nothing"));
    }
}
