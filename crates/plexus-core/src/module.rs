//! Adapter between one [`Processor`] instance and the graph.
//!
//! [`PluginModule::instantiate`] splits a plugin into two halves:
//!
//! - [`PluginModule`] lives with the audio thread. It owns the processor, the
//!   port buffers and the control-value cache.
//! - [`ModuleControl`] lives with the UI thread. It writes value changes into
//!   the `events` ring and polls the `notifications` ring on a timer.
//!
//! Each [`run`](PluginModule::run) first drains `events` into the cache and
//! forwards values that actually changed to `notifications`. It then loads the
//! cached values into the control ports and delivers pending worker responses.
//! Only after that does it run the processor.

use crate::midi::{EventBuffer, MidiEvent};
use crate::plugin::PluginError;
use crate::port::{ChannelConfig, PortDescription, PortType};
use crate::port_event::{
    PORT_EVENT_HEADER_SIZE, PROTOCOL_FLOAT, PROTOCOL_MIDI, PortEvent, read_port_event,
    write_port_event,
};
use crate::processor::{PortBuffers, ProcessContext, Processor, RunContext};
use crate::ring_buffer::{RingReader, RingWriter, ring_buffer};
use crate::work::{WorkThread, WorkerHandle};

/// Most ports a single module may expose.
pub const MAX_PORTS: u32 = 1024;

/// Sizes used when instantiating a module.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleConfig {
    /// Sample rate handed to the processor on activation.
    pub sample_rate: f64,
    /// Largest block the module renders in one call.
    pub block_size: usize,
    /// Capacity of the UI → audio ring in bytes.
    pub event_buffer_size: usize,
    /// Capacity of the audio → UI ring in bytes.
    pub notification_buffer_size: usize,
    /// Capacity of the worker response ring in bytes.
    pub worker_response_size: usize,
    /// Events per sequence port per block.
    pub event_capacity: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            event_buffer_size: 4096,
            notification_buffer_size: 4096,
            worker_response_size: 2048,
            event_capacity: 512,
        }
    }
}

/// Receives port changes forwarded by [`ModuleControl::timer_callback`].
pub trait PortListener: Send {
    /// One notification record.
    fn port_event(&mut self, port: u32, protocol: u32, data: &[u8]);
}

/// Host callback for control value changes.
pub type PortNotifyCallback = Box<dyn FnMut(u32, f32) + Send>;

/// Audio-thread half of a hosted plugin.
pub struct PluginModule {
    processor: Box<dyn Processor>,
    ports: Vec<PortDescription>,
    channels: ChannelConfig,
    buffers: PortBuffers,
    /// One value per port index. Only control entries are meaningful.
    values: Vec<f32>,
    events: RingReader,
    notifications: RingWriter,
    worker: Option<WorkerHandle>,
    scratch: Vec<u8>,
    sample_rate: f64,
    block_size: usize,
    active: bool,
}

impl PluginModule {
    /// Builds the module and its UI-side control from a processor.
    ///
    /// If the processor offers a background worker it is registered on `work`;
    /// a processor that needs one fails to load when `work` is `None`.
    pub fn instantiate(
        mut processor: Box<dyn Processor>,
        config: &ModuleConfig,
        work: Option<&WorkThread>,
    ) -> Result<(Self, ModuleControl), PluginError> {
        if config.block_size == 0 {
            return Err(PluginError::InvalidConfig(
                "block size must be positive".into(),
            ));
        }
        if !(config.sample_rate > 0.0) {
            return Err(PluginError::InvalidConfig(format!(
                "invalid sample rate {}",
                config.sample_rate
            )));
        }

        let num_ports = processor.num_ports();
        if num_ports > MAX_PORTS {
            return Err(PluginError::Instantiate(format!(
                "{num_ports} ports requested, at most {MAX_PORTS} supported"
            )));
        }

        let mut ports: Vec<PortDescription> = (0..num_ports)
            .map(|index| PortDescription {
                index,
                port_type: processor.port_type(index),
                input: processor.is_port_input(index),
                channel: 0,
                symbol: processor.port_symbol(index),
                name: processor.port_name(index),
                range: processor.port_range(index),
            })
            .collect();
        let channels = ChannelConfig::from_ports(&mut ports);

        let types: Vec<PortType> = ports.iter().map(|p| p.port_type).collect();
        let mut buffers = PortBuffers::new(&types, config.block_size, config.event_capacity);
        let values: Vec<f32> = ports
            .iter()
            .map(|p| {
                if p.port_type == PortType::Control {
                    p.range.default
                } else {
                    0.0
                }
            })
            .collect();
        for port in &ports {
            buffers.set_control(port.index, values[port.index as usize]);
        }

        let worker = match (processor.take_worker(), work) {
            (Some(worker), Some(thread)) => {
                Some(thread.register(worker, config.worker_response_size))
            }
            (Some(_), None) => return Err(PluginError::WorkerUnavailable),
            (None, _) => None,
        };

        let (events_tx, events_rx) = ring_buffer(config.event_buffer_size);
        let (notify_tx, notify_rx) = ring_buffer(config.notification_buffer_size);

        let control = ModuleControl::new(ports.clone(), values.clone(), events_tx, notify_rx);
        let module = Self {
            processor,
            ports,
            channels,
            buffers,
            values,
            scratch: vec![0; events_rx.capacity()],
            events: events_rx,
            notifications: notify_tx,
            worker,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            active: false,
        };
        Ok((module, control))
    }

    // --- Port layout ---

    /// Port descriptions, indexed by port index.
    pub fn ports(&self) -> &[PortDescription] {
        &self.ports
    }

    /// Number of ports.
    pub fn num_ports(&self) -> u32 {
        self.ports.len() as u32
    }

    /// Type of port `index`, `Unknown` if out of range.
    pub fn port_type(&self, index: u32) -> PortType {
        self.ports
            .get(index as usize)
            .map_or(PortType::Unknown, |p| p.port_type)
    }

    /// Whether port `index` is an input. `false` if out of range.
    pub fn is_port_input(&self, index: u32) -> bool {
        self.ports.get(index as usize).is_some_and(|p| p.input)
    }

    /// Index of the port with the given symbol.
    pub fn port_index(&self, symbol: &str) -> Option<u32> {
        self.ports
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.index)
    }

    /// Channel mappings built at load time.
    pub fn channels(&self) -> &ChannelConfig {
        &self.channels
    }

    // --- Lifecycle ---

    /// Current sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Largest block rendered per call.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether `run` renders.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a background worker is attached.
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Activates the processor. No-op when already active.
    pub fn activate(&mut self) {
        if !self.active {
            self.processor.activate(self.sample_rate, self.block_size);
            self.active = true;
        }
    }

    /// Deactivates the processor. No-op when inactive.
    pub fn deactivate(&mut self) {
        if self.active {
            self.processor.deactivate();
            self.active = false;
        }
    }

    /// Deactivates and releases the background worker.
    pub fn cleanup(&mut self) {
        self.deactivate();
        self.worker = None;
    }

    /// Re-activates the processor at a new sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate == self.sample_rate || !(sample_rate > 0.0) {
            return;
        }
        let was_active = self.active;
        self.deactivate();
        self.sample_rate = sample_rate;
        if was_active {
            self.activate();
        }
    }

    // --- Realtime ---

    /// Port buffers.
    pub fn buffers(&self) -> &PortBuffers {
        &self.buffers
    }

    /// Mutable port buffers.
    pub fn buffers_mut(&mut self) -> &mut PortBuffers {
        &mut self.buffers
    }

    /// Cached control value of `port`.
    pub fn control_value(&self, port: u32) -> Option<f32> {
        match self.ports.get(port as usize) {
            Some(p) if p.port_type == PortType::Control => Some(self.values[port as usize]),
            _ => None,
        }
    }

    /// All cached values, indexed by port.
    pub fn control_values(&self) -> &[f32] {
        &self.values
    }

    /// Copies host data into port `index`. Returns the number of values copied.
    ///
    /// Audio-rate ports take up to one block of samples. Control inputs take
    /// `data[0]` through the cache.
    pub fn connect_port(&mut self, index: u32, data: &[f32]) -> usize {
        match self.port_type(index) {
            PortType::Audio | PortType::Cv => {
                let dest = self.buffers.audio_mut(index);
                let n = dest.len().min(data.len());
                dest[..n].copy_from_slice(&data[..n]);
                n
            }
            PortType::Control => match data.first() {
                Some(&value) if self.is_port_input(index) => {
                    self.write_control(index, value);
                    1
                }
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Updates the cached value of a control input. Realtime only.
    ///
    /// A value that differs from the cache is forwarded to the notification
    /// ring. Returns whether the value changed.
    pub fn write_control(&mut self, port: u32, value: f32) -> bool {
        match self.ports.get(port as usize) {
            Some(p) if p.port_type == PortType::Control && p.input => {}
            _ => return false,
        }
        let cached = &mut self.values[port as usize];
        if *cached == value {
            return false;
        }
        *cached = value;
        notify(&mut self.notifications, port, value);
        true
    }

    /// Clears input buffers before a block: audio inputs are zeroed and every
    /// event sequence is emptied.
    pub fn prepare_inputs(&mut self, frames: usize) {
        for port in &self.ports {
            if port.port_type.is_audio_rate() && port.input {
                let buf = self.buffers.audio_mut(port.index);
                let n = frames.min(buf.len());
                buf[..n].fill(0.0);
            } else if port.port_type.is_sequence()
                && let Some(events) = self.buffers.events_mut(port.index)
            {
                events.clear();
            }
        }
    }

    /// Hands each audio output channel to `fill`. Used to inject device input.
    pub fn fill_audio_outputs(&mut self, frames: usize, mut fill: impl FnMut(usize, &mut [f32])) {
        for (channel, &port) in self.channels.outputs().ports(PortType::Audio).iter().enumerate() {
            let buf = self.buffers.audio_mut(port);
            let n = frames.min(buf.len());
            fill(channel, &mut buf[..n]);
        }
    }

    /// Hands each audio input channel to `read`. Used to collect device output.
    pub fn read_audio_inputs(&self, frames: usize, mut read: impl FnMut(usize, &[f32])) {
        for (channel, &port) in self.channels.inputs().ports(PortType::Audio).iter().enumerate() {
            let buf = self.buffers.audio(port);
            read(channel, &buf[..frames.min(buf.len())]);
        }
    }

    /// Hands each MIDI output sequence to `fill`. Used to inject device MIDI.
    pub fn fill_midi_outputs(&mut self, mut fill: impl FnMut(&mut EventBuffer)) {
        for &port in self.channels.outputs().ports(PortType::Midi) {
            if let Some(events) = self.buffers.events_mut(port) {
                fill(events);
            }
        }
    }

    /// Renders one block.
    ///
    /// Order within the call: pending `events` are applied, control ports are
    /// loaded from the cache, worker responses are delivered, the processor
    /// runs, `end_run` is called, and changed control outputs are notified.
    pub fn run(&mut self, context: &ProcessContext) {
        if !self.active {
            return;
        }
        let frames = context.frame_count.min(self.block_size);

        self.drain_events(frames);

        for &port in self.channels.inputs().ports(PortType::Control) {
            self.buffers.set_control(port, self.values[port as usize]);
        }

        if let Some(worker) = self.worker.as_mut() {
            let processor = &mut self.processor;
            worker.process_work_responses(|data| processor.work_response(data));
        }

        let process = ProcessContext::new(context.start_frame, frames);
        let mut run_context = RunContext::new(process, self.worker.as_ref());
        self.processor.run(&mut self.buffers, &mut run_context);
        self.processor.end_run();

        for &port in self.channels.outputs().ports(PortType::Control) {
            let value = self.buffers.control(port);
            let cached = &mut self.values[port as usize];
            if *cached != value {
                *cached = value;
                notify(&mut self.notifications, port, value);
            }
        }
    }

    /// MIDI stamped past the end of this block is moved to its last frame.
    fn drain_events(&mut self, frames: usize) {
        let last_frame = u32::try_from(frames.saturating_sub(1)).unwrap_or(u32::MAX);
        while let Some(event) = read_port_event(&mut self.events, &mut self.scratch) {
            let size = event.size as usize;
            match event.protocol {
                PROTOCOL_FLOAT if size == 4 => {
                    let b = &self.scratch;
                    let value = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    self.write_control(event.index, value);
                }
                PROTOCOL_MIDI if size > 0 => {
                    let frame = event.frame().min(last_frame);
                    let midi = MidiEvent::new(frame, &self.scratch[..size]);
                    if let (Some(midi), Some(events)) = (midi, self.buffers.events_mut(event.index))
                    {
                        events.push(midi);
                    }
                }
                _ => {}
            }
        }
    }

    // --- State ---

    /// Saves control input values followed by the processor's own blob.
    ///
    /// Layout: `u32 count`, then `count` pairs of `u32 port, f32 value`, then
    /// the processor blob. Little-endian.
    pub fn save_state(&mut self) -> Vec<u8> {
        let controls = self.channels.inputs().ports(PortType::Control);
        let blob = self.processor.save_state();
        let mut out = Vec::with_capacity(4 + controls.len() * 8 + blob.len());
        out.extend_from_slice(&(controls.len() as u32).to_le_bytes());
        for &port in controls {
            out.extend_from_slice(&port.to_le_bytes());
            out.extend_from_slice(&self.values[port as usize].to_le_bytes());
        }
        out.extend_from_slice(&blob);
        out
    }

    /// Restores a blob produced by [`save_state`](Self::save_state).
    ///
    /// Values for ports that are not control inputs are ignored.
    pub fn restore_state(&mut self, data: &[u8]) -> Result<(), PluginError> {
        let read_u32 = |at: usize| -> Option<u32> {
            let bytes = data.get(at..at + 4)?;
            Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        };
        let count = read_u32(0).ok_or_else(|| PluginError::State("truncated header".into()))?;
        let body = 4 + count as usize * 8;
        if data.len() < body {
            return Err(PluginError::State(format!(
                "expected {count} control values, got {} bytes",
                data.len()
            )));
        }
        for i in 0..count as usize {
            let at = 4 + i * 8;
            let (Some(port), Some(bits)) = (read_u32(at), read_u32(at + 4)) else {
                continue;
            };
            let is_control_input = self
                .ports
                .get(port as usize)
                .is_some_and(|p| p.port_type == PortType::Control && p.input);
            if is_control_input {
                let value = f32::from_bits(bits);
                self.values[port as usize] = value;
                self.buffers.set_control(port, value);
            }
        }
        self.processor
            .restore_state(&data[body..])
            .map_err(PluginError::State)
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("ports", &self.ports.len())
            .field("active", &self.active)
            .field("worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

fn notify(writer: &mut RingWriter, port: u32, value: f32) -> bool {
    if !writer.can_write(PORT_EVENT_HEADER_SIZE + 4) {
        return false;
    }
    write_port_event(writer, &PortEvent::float(port), &value.to_le_bytes())
}

/// UI-thread half of a hosted plugin.
pub struct ModuleControl {
    ports: Vec<PortDescription>,
    /// Last value seen per port.
    values: Vec<f32>,
    events: RingWriter,
    notifications: RingReader,
    scratch: Vec<u8>,
    listener: Option<Box<dyn PortListener>>,
    on_port_notify: Option<PortNotifyCallback>,
}

impl ModuleControl {
    fn new(
        ports: Vec<PortDescription>,
        values: Vec<f32>,
        events: RingWriter,
        notifications: RingReader,
    ) -> Self {
        Self {
            ports,
            values,
            scratch: vec![0; notifications.capacity()],
            events,
            notifications,
            listener: None,
            on_port_notify: None,
        }
    }

    /// Port descriptions.
    pub fn ports(&self) -> &[PortDescription] {
        &self.ports
    }

    /// Last value seen for `port`.
    pub fn value(&self, port: u32) -> Option<f32> {
        self.values.get(port as usize).copied()
    }

    /// Last values seen, indexed by port.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Overwrites the last-seen values, e.g. after a state restore.
    pub fn sync_values(&mut self, values: &[f32]) {
        let n = self.values.len().min(values.len());
        self.values[..n].copy_from_slice(&values[..n]);
    }

    /// Attaches an editor that receives every notification.
    pub fn set_listener(&mut self, listener: Option<Box<dyn PortListener>>) {
        self.listener = listener;
    }

    /// Sets the host callback for control value changes.
    pub fn set_on_port_notify(&mut self, callback: Option<PortNotifyCallback>) {
        self.on_port_notify = callback;
    }

    /// Queues raw data for a port. Returns `false` if the port does not exist,
    /// `data` is empty, or the ring is full.
    pub fn write_to_port(&mut self, port: u32, protocol: u32, data: &[u8]) -> bool {
        if data.is_empty() || port as usize >= self.ports.len() {
            return false;
        }
        let Ok(size) = u32::try_from(data.len()) else {
            return false;
        };
        let event = PortEvent {
            size,
            protocol,
            ..PortEvent::float(port)
        };
        write_port_event(&mut self.events, &event, data)
    }

    /// Queues a control value change.
    pub fn set_control(&mut self, port: u32, value: f32) -> bool {
        self.write_to_port(port, PROTOCOL_FLOAT, &value.to_le_bytes())
    }

    /// Queues a control value change addressed by port symbol.
    pub fn set_control_by_symbol(&mut self, symbol: &str, value: f32) -> bool {
        match self.ports.iter().find(|p| p.symbol == symbol) {
            Some(p) => {
                let index = p.index;
                self.set_control(index, value)
            }
            None => false,
        }
    }

    /// Queues a MIDI message for an event or MIDI input port.
    pub fn send_midi(&mut self, port: u32, event: MidiEvent) -> bool {
        let bytes = event.bytes();
        let Ok(size) = u32::try_from(bytes.len()) else {
            return false;
        };
        let header = PortEvent {
            index: port,
            protocol: PROTOCOL_MIDI,
            time: crate::port_event::PortEventTime::Frames(i64::from(event.frame)),
            size,
        };
        port < self.ports.len() as u32 && write_port_event(&mut self.events, &header, bytes)
    }

    /// Re-sends the last known value of every control input.
    pub fn send_control_values(&mut self) -> usize {
        let mut sent = 0;
        for i in 0..self.ports.len() {
            let port = &self.ports[i];
            if port.port_type == PortType::Control && port.input {
                let (index, value) = (port.index, self.values[i]);
                if self.set_control(index, value) {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Drains the notification ring. Call at a fixed rate from the UI thread.
    ///
    /// Every record goes to the listener; float values also update the
    /// last-seen cache and go to the host callback. Returns the number of
    /// records drained.
    pub fn timer_callback(&mut self) -> usize {
        let mut drained = 0;
        while let Some(event) = read_port_event(&mut self.notifications, &mut self.scratch) {
            let data = &self.scratch[..event.size as usize];
            if event.protocol == PROTOCOL_FLOAT && data.len() == 4 {
                let value = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                if let Some(slot) = self.values.get_mut(event.index as usize) {
                    *slot = value;
                }
                if let Some(callback) = self.on_port_notify.as_mut() {
                    callback(event.index, value);
                }
            }
            if let Some(listener) = self.listener.as_mut() {
                listener.port_event(event.index, event.protocol, data);
            }
            drained += 1;
        }
        drained
    }
}

impl std::fmt::Debug for ModuleControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleControl")
            .field("ports", &self.ports.len())
            .field("listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortRange;
    use crate::work::{Responder, WorkError, Worker};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Port 0: audio in, 1: audio out, 2: gain control in, 3: peak control out, 4: midi in.
    struct Amp {
        notes: usize,
        blob: Vec<u8>,
    }

    impl Processor for Amp {
        fn num_ports(&self) -> u32 {
            5
        }
        fn port_type(&self, index: u32) -> PortType {
            match index {
                0 | 1 => PortType::Audio,
                2 | 3 => PortType::Control,
                4 => PortType::Midi,
                _ => PortType::Unknown,
            }
        }
        fn is_port_input(&self, index: u32) -> bool {
            matches!(index, 0 | 2 | 4)
        }
        fn port_symbol(&self, index: u32) -> String {
            ["in", "out", "gain", "peak", "midi"][index as usize].to_string()
        }
        fn port_range(&self, index: u32) -> PortRange {
            if index == 2 {
                PortRange::new(0.0, 2.0, 1.0)
            } else {
                PortRange::default()
            }
        }
        fn run(&mut self, ports: &mut PortBuffers, ctx: &mut RunContext<'_>) {
            let gain = ports.control(2);
            let frames = ctx.frames;
            let mut peak = 0.0f32;
            if let Some((input, output)) = ports.audio_in_out(0, 1) {
                for (o, i) in output[..frames].iter_mut().zip(&input[..frames]) {
                    *o = i * gain;
                    peak = peak.max(o.abs());
                }
            }
            ports.set_control(3, peak);
            self.notes += ports.events(4).map_or(0, EventBuffer::len);
        }
        fn save_state(&mut self) -> Vec<u8> {
            self.blob.clone()
        }
        fn restore_state(&mut self, data: &[u8]) -> Result<(), String> {
            self.blob = data.to_vec();
            Ok(())
        }
    }

    fn amp() -> (PluginModule, ModuleControl) {
        let config = ModuleConfig {
            block_size: 8,
            ..ModuleConfig::default()
        };
        let (mut module, control) = PluginModule::instantiate(
            Box::new(Amp {
                notes: 0,
                blob: vec![],
            }),
            &config,
            None,
        )
        .unwrap();
        module.activate();
        (module, control)
    }

    fn ctx() -> ProcessContext {
        ProcessContext::new(0, 8)
    }

    #[test]
    fn test_ports_and_channels() {
        let (module, control) = amp();
        assert_eq!(module.num_ports(), 5);
        assert_eq!(module.port_index("gain"), Some(2));
        assert_eq!(module.port_index("nope"), None);
        assert_eq!(module.channels().port(PortType::Audio, 0, false), Some(1));
        assert_eq!(module.control_value(2), Some(1.0));
        assert_eq!(module.control_value(0), None);
        assert_eq!(control.value(2), Some(1.0));
    }

    #[test]
    fn test_event_visible_on_next_run() {
        let (mut module, mut control) = amp();
        assert!(control.set_control(2, 0.5));
        assert_eq!(module.control_value(2), Some(1.0));

        module.connect_port(0, &[1.0; 8]);
        module.run(&ctx());
        assert_eq!(module.control_value(2), Some(0.5));
        assert_eq!(module.buffers().audio(1), &[0.5; 8]);
    }

    #[test]
    fn test_changed_value_is_notified() {
        let (mut module, mut control) = amp();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        control.set_on_port_notify(Some(Box::new(move |port, value| {
            sink.lock().push((port, value));
        })));

        control.set_control(2, 0.25);
        module.run(&ctx());
        control.timer_callback();

        assert!(seen.lock().contains(&(2, 0.25)));
        assert_eq!(control.value(2), Some(0.25));
    }

    #[test]
    fn test_unchanged_value_is_not_notified() {
        let (mut module, mut control) = amp();
        module.run(&ctx());
        control.timer_callback();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        control.set_on_port_notify(Some(Box::new(move |port, value| {
            sink.lock().push((port, value));
        })));

        // 1.0 is already the cached gain.
        control.set_control(2, 1.0);
        module.run(&ctx());
        assert_eq!(control.timer_callback(), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_control_output_change_notified() {
        let (mut module, mut control) = amp();
        module.connect_port(0, &[0.75; 8]);
        module.run(&ctx());
        control.timer_callback();
        assert_eq!(control.value(3), Some(0.75));
    }

    #[test]
    fn test_listener_receives_raw_records() {
        struct Recorder(Arc<Mutex<Vec<(u32, u32, Vec<u8>)>>>);
        impl PortListener for Recorder {
            fn port_event(&mut self, port: u32, protocol: u32, data: &[u8]) {
                self.0.lock().push((port, protocol, data.to_vec()));
            }
        }
        let (mut module, mut control) = amp();
        let log = Arc::new(Mutex::new(Vec::new()));
        control.set_listener(Some(Box::new(Recorder(Arc::clone(&log)))));
        control.set_control(2, 2.0);
        module.run(&ctx());
        control.timer_callback();
        assert_eq!(log.lock()[0], (2, PROTOCOL_FLOAT, 2.0f32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_midi_event_reaches_port() {
        let (mut module, mut control) = amp();
        assert!(control.send_midi(4, MidiEvent::note_on(0, 0, 60, 100)));
        module.prepare_inputs(8);
        module.run(&ctx());
        assert_eq!(module.buffers().events(4).map(EventBuffer::len), Some(1));
    }

    #[test]
    fn test_midi_past_block_end_lands_on_last_frame() {
        let (mut module, mut control) = amp();
        assert!(control.send_midi(4, MidiEvent::note_on(100, 0, 60, 100)));
        assert!(control.send_midi(4, MidiEvent::note_off(2, 0, 60)));
        module.prepare_inputs(4);
        module.run(&ProcessContext::new(4, 4));
        let events = module.buffers().events(4).unwrap();
        let frames: Vec<u32> = events.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![3, 2]);
    }

    #[test]
    fn test_write_to_missing_port_rejected() {
        let (_, mut control) = amp();
        assert!(!control.set_control(99, 1.0));
        assert!(!control.write_to_port(0, PROTOCOL_FLOAT, &[]));
        assert!(!control.set_control_by_symbol("nope", 1.0));
        assert!(control.set_control_by_symbol("gain", 1.5));
    }

    #[test]
    fn test_inactive_module_does_not_run() {
        let (mut module, mut control) = amp();
        module.deactivate();
        control.set_control(2, 0.1);
        module.run(&ctx());
        assert_eq!(module.control_value(2), Some(1.0));
        module.activate();
        module.run(&ctx());
        assert_eq!(module.control_value(2), Some(0.1));
    }

    #[test]
    fn test_state_round_trip() {
        let (mut module, mut control) = amp();
        control.set_control(2, 1.75);
        module.run(&ctx());
        let state = module.save_state();

        let (mut other, _) = amp();
        other.restore_state(&state).unwrap();
        assert_eq!(other.control_value(2), Some(1.75));
        assert_eq!(other.buffers().control(2), 1.75);
    }

    #[test]
    fn test_truncated_state_rejected() {
        let (mut module, _) = amp();
        assert!(matches!(module.restore_state(&[1]), Err(PluginError::State(_))));
        assert!(matches!(
            module.restore_state(&[2, 0, 0, 0, 1]),
            Err(PluginError::State(_))
        ));
    }

    #[test]
    fn test_sample_rate_change_reactivates() {
        let (mut module, _) = amp();
        module.set_sample_rate(96000.0);
        assert_eq!(module.sample_rate(), 96000.0);
        assert!(module.is_active());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = ModuleConfig {
            block_size: 0,
            ..ModuleConfig::default()
        };
        let result = PluginModule::instantiate(
            Box::new(Amp {
                notes: 0,
                blob: vec![],
            }),
            &config,
            None,
        );
        assert!(matches!(result, Err(PluginError::InvalidConfig(_))));
    }

    /// Claims far more ports than any module can hold.
    struct Sprawling;

    impl Processor for Sprawling {
        fn num_ports(&self) -> u32 {
            u32::MAX
        }
        fn port_type(&self, _index: u32) -> PortType {
            PortType::Audio
        }
        fn is_port_input(&self, _index: u32) -> bool {
            true
        }
        fn port_symbol(&self, index: u32) -> String {
            format!("in_{index}")
        }
        fn run(&mut self, _ports: &mut PortBuffers, _ctx: &mut RunContext<'_>) {}
    }

    #[test]
    fn test_excessive_port_count_rejected() {
        let result = PluginModule::instantiate(Box::new(Sprawling), &ModuleConfig::default(), None);
        assert!(matches!(result, Err(PluginError::Instantiate(_))));
    }

    /// Schedules its input gain as work; the worker answers with the gain doubled.
    struct Deferred {
        applied: Arc<Mutex<Vec<f32>>>,
        sent: bool,
    }

    struct Doubler;

    impl Worker for Doubler {
        fn process_request(
            &mut self,
            request: &[u8],
            responder: &mut Responder<'_>,
        ) -> Result<(), WorkError> {
            let bytes: [u8; 4] = request
                .try_into()
                .map_err(|_| WorkError::Malformed("expected f32".into()))?;
            let doubled = f32::from_le_bytes(bytes) * 2.0;
            responder.respond(&doubled.to_le_bytes());
            Ok(())
        }
    }

    impl Processor for Deferred {
        fn num_ports(&self) -> u32 {
            0
        }
        fn port_type(&self, _: u32) -> PortType {
            PortType::Unknown
        }
        fn is_port_input(&self, _: u32) -> bool {
            false
        }
        fn run(&mut self, _: &mut PortBuffers, ctx: &mut RunContext<'_>) {
            if !self.sent {
                self.sent = ctx.schedule_work(&21.0f32.to_le_bytes());
            }
        }
        fn take_worker(&mut self) -> Option<Box<dyn Worker>> {
            Some(Box::new(Doubler))
        }
        fn work_response(&mut self, data: &[u8]) {
            if let Ok(bytes) = <[u8; 4]>::try_from(data) {
                self.applied.lock().push(f32::from_le_bytes(bytes));
            }
        }
    }

    #[test]
    fn test_worker_requires_thread() {
        let result = PluginModule::instantiate(
            Box::new(Deferred {
                applied: Arc::default(),
                sent: false,
            }),
            &ModuleConfig::default(),
            None,
        );
        assert!(matches!(result, Err(PluginError::WorkerUnavailable)));
    }

    #[test]
    fn test_worker_response_delivered_before_run() {
        let thread = WorkThread::new("module-test", 1024).unwrap();
        let applied = Arc::new(Mutex::new(Vec::new()));
        let (mut module, _) = PluginModule::instantiate(
            Box::new(Deferred {
                applied: Arc::clone(&applied),
                sent: false,
            }),
            &ModuleConfig::default(),
            Some(&thread),
        )
        .unwrap();
        assert!(module.has_worker());
        module.activate();

        let deadline = Instant::now() + Duration::from_secs(5);
        while applied.lock().is_empty() && Instant::now() < deadline {
            module.run(&ProcessContext::new(0, 64));
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(*applied.lock(), vec![42.0]);

        module.cleanup();
        assert!(!module.has_worker());
        assert_eq!(thread.worker_count(), 0);
    }
}
