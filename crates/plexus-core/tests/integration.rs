//! Integration tests for plexus-core.
//!
//! Builds real graphs from internal and test plugins, compiles them, and runs
//! the compiled schedule against an in-memory device: ordering, audio flow,
//! control round trips, MIDI delivery and deferred work.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use plexus_core::{
    AUDIO_INPUT_ID, AUDIO_OUTPUT_ID, EngineGraph, EventBuffer, GAIN_ID, GraphError, GraphIo,
    INTERNAL_FORMAT, Instance, MIDI_INPUT_ID, MidiEvent, ModuleConfig, NodeId, NodeKind, PortArc,
    PortBuffers, PortType, PluginDescription, PluginRegistry, ProcessContext, Processor,
    Responder, RunContext, WorkError, Worker,
};

const FRAMES: usize = 64;

/// Gain ports: 0-1 audio in, 2-3 audio out, 4 gain.
const GAIN_OUT_L: u32 = 2;
const GAIN_IN_L: u32 = 0;
const GAIN_PORT: u32 = 4;

/// In-memory device with two channels each way.
struct TestIo {
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    midi: Vec<MidiEvent>,
}

impl TestIo {
    fn new(input: f32) -> Self {
        Self {
            inputs: vec![vec![input; FRAMES]; 2],
            outputs: vec![vec![0.0; FRAMES]; 2],
            midi: Vec::new(),
        }
    }
}

impl GraphIo for TestIo {
    fn audio_input(&mut self, channel: usize, dest: &mut [f32]) {
        if let Some(src) = self.inputs.get(channel) {
            let n = dest.len().min(src.len());
            dest[..n].copy_from_slice(&src[..n]);
        }
    }

    fn audio_output(&mut self, channel: usize, source: &[f32]) {
        if let Some(dst) = self.outputs.get_mut(channel) {
            for (d, s) in dst.iter_mut().zip(source) {
                *d += s;
            }
        }
    }

    fn midi_input(&mut self, dest: &mut EventBuffer) {
        for event in &self.midi {
            dest.push(*event);
        }
    }
}

fn setup() -> (EngineGraph, PluginRegistry) {
    let config = ModuleConfig {
        block_size: FRAMES,
        ..ModuleConfig::default()
    };
    (
        EngineGraph::new(config, 4096).unwrap(),
        PluginRegistry::with_internal(2, 2),
    )
}

fn add(graph: &mut EngineGraph, registry: &PluginRegistry, id: &str) -> NodeId {
    let desc = registry.find(INTERNAL_FORMAT, id).unwrap();
    graph.add_node(registry, &desc).unwrap()
}

fn run_cycle(graph: &EngineGraph, io: &mut TestIo) {
    let reader = graph.reader();
    let guard = reader.load();
    let compiled = guard.as_ref().expect("graph compiled");
    compiled.process(&ProcessContext::new(0, FRAMES), io);
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_chain_compiles_in_order_and_cycle_keeps_it() {
    let (mut graph, registry) = setup();
    let a = add(&mut graph, &registry, GAIN_ID);
    let b = add(&mut graph, &registry, GAIN_ID);
    let c = add(&mut graph, &registry, GAIN_ID);
    graph.connect(a, GAIN_OUT_L, b, GAIN_IN_L).unwrap();
    graph.connect(b, GAIN_OUT_L, c, GAIN_IN_L).unwrap();
    assert_eq!(graph.compile().unwrap().order(), vec![a, b, c]);

    // C→A with B→C still present closes A→B→C→A.
    graph.connect(c, GAIN_OUT_L, a, GAIN_IN_L).unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::CycleDetected)));
    assert_eq!(graph.compiled().unwrap().order(), vec![a, b, c]);
    assert_eq!(graph.reader().load_full().unwrap().order(), vec![a, b, c]);
}

#[test]
fn test_rewiring_without_cycle_reorders() {
    let (mut graph, registry) = setup();
    let a = add(&mut graph, &registry, GAIN_ID);
    let b = add(&mut graph, &registry, GAIN_ID);
    let c = add(&mut graph, &registry, GAIN_ID);
    graph.connect(a, GAIN_OUT_L, b, GAIN_IN_L).unwrap();
    graph.connect(b, GAIN_OUT_L, c, GAIN_IN_L).unwrap();
    graph.compile().unwrap();

    // Dropping B→C before adding C→A leaves the chain C→A→B.
    graph
        .remove_arc(&PortArc::new(b.index(), GAIN_OUT_L, c.index(), GAIN_IN_L))
        .unwrap();
    graph.connect(c, GAIN_OUT_L, a, GAIN_IN_L).unwrap();
    assert_eq!(graph.compile().unwrap().order(), vec![c, a, b]);
}

#[test]
fn test_can_connect_blocks_cycle_before_it_is_made() {
    let (mut graph, registry) = setup();
    let a = add(&mut graph, &registry, GAIN_ID);
    let b = add(&mut graph, &registry, GAIN_ID);
    let c = add(&mut graph, &registry, GAIN_ID);
    graph.connect(a, GAIN_OUT_L, b, GAIN_IN_L).unwrap();
    graph.connect(b, GAIN_OUT_L, c, GAIN_IN_L).unwrap();
    assert!(graph.arc_table().is_an_input_to(a.index(), c.index()));
    assert!(!graph.can_connect(&PortArc::new(c.index(), GAIN_OUT_L, a.index(), GAIN_IN_L)));
}

// ============================================================================
// Audio and control flow
// ============================================================================

#[test]
fn test_audio_flows_through_gain() {
    let (mut graph, registry) = setup();
    let input = add(&mut graph, &registry, AUDIO_INPUT_ID);
    let gain = add(&mut graph, &registry, GAIN_ID);
    let output = add(&mut graph, &registry, AUDIO_OUTPUT_ID);
    for ch in 0..2 {
        graph.connect(input, ch, gain, ch).unwrap();
        graph.connect(gain, 2 + ch, output, ch).unwrap();
    }
    graph.compile().unwrap();

    graph
        .node_mut(gain)
        .unwrap()
        .control_mut()
        .set_control(GAIN_PORT, 0.5);

    let mut io = TestIo::new(0.8);
    run_cycle(&graph, &mut io);
    for channel in &io.outputs {
        assert!(channel.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }

    // The change made it back to the UI side on the next timer tick.
    assert!(graph.timer_callback() >= 1);
    assert_eq!(graph.node(gain).unwrap().control().value(GAIN_PORT), Some(0.5));
}

#[test]
fn test_fan_in_sums() {
    let (mut graph, registry) = setup();
    let input = add(&mut graph, &registry, AUDIO_INPUT_ID);
    let g1 = add(&mut graph, &registry, GAIN_ID);
    let g2 = add(&mut graph, &registry, GAIN_ID);
    let output = add(&mut graph, &registry, AUDIO_OUTPUT_ID);
    for g in [g1, g2] {
        graph.connect(input, 0, g, GAIN_IN_L).unwrap();
        graph.connect(g, GAIN_OUT_L, output, 0).unwrap();
    }
    graph.compile().unwrap();

    let mut io = TestIo::new(0.25);
    run_cycle(&graph, &mut io);
    assert!(io.outputs[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
    assert!(io.outputs[1].iter().all(|&s| s == 0.0));
}

#[test]
fn test_contended_node_is_skipped() {
    let (mut graph, registry) = setup();
    let input = add(&mut graph, &registry, AUDIO_INPUT_ID);
    let gain = add(&mut graph, &registry, GAIN_ID);
    let output = add(&mut graph, &registry, AUDIO_OUTPUT_ID);
    graph.connect(input, 0, gain, GAIN_IN_L).unwrap();
    graph.connect(gain, GAIN_OUT_L, output, 0).unwrap();
    graph.compile().unwrap();

    let module = Arc::clone(graph.node(gain).unwrap().module());
    let held = module.lock();
    let mut io = TestIo::new(1.0);
    run_cycle(&graph, &mut io);
    drop(held);
    assert!(io.outputs[0].iter().all(|&s| s == 0.0));

    let mut io = TestIo::new(1.0);
    run_cycle(&graph, &mut io);
    assert!(io.outputs[0].iter().all(|&s| s == 1.0));
}

// ============================================================================
// MIDI
// ============================================================================

/// One MIDI input; counts every event it sees.
struct MidiCounter {
    seen: Arc<AtomicUsize>,
}

impl Processor for MidiCounter {
    fn num_ports(&self) -> u32 {
        1
    }
    fn port_type(&self, _index: u32) -> PortType {
        PortType::Midi
    }
    fn is_port_input(&self, _index: u32) -> bool {
        true
    }
    fn run(&mut self, ports: &mut PortBuffers, _context: &mut RunContext<'_>) {
        let n = ports.events(0).map_or(0, EventBuffer::len);
        self.seen.fetch_add(n, Ordering::Relaxed);
    }
}

#[test]
fn test_midi_reaches_plugin() {
    let (mut graph, registry) = setup();
    let midi = add(&mut graph, &registry, MIDI_INPUT_ID);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = graph
        .add_instance(
            PluginDescription::new("Counter", "Test", "counter", 0, 0),
            Instance {
                processor: Box::new(MidiCounter {
                    seen: Arc::clone(&seen),
                }),
                kind: NodeKind::Plugin,
            },
        )
        .unwrap();
    graph.connect(midi, 0, counter, 0).unwrap();
    graph.compile().unwrap();

    let mut io = TestIo::new(0.0);
    io.midi = vec![MidiEvent::note_on(0, 0, 60, 100), MidiEvent::note_off(8, 0, 60)];
    run_cycle(&graph, &mut io);
    assert_eq!(seen.load(Ordering::Relaxed), 2);

    // Events do not linger into the next cycle.
    io.midi.clear();
    run_cycle(&graph, &mut io);
    assert_eq!(seen.load(Ordering::Relaxed), 2);

    // UI-originated MIDI goes through the node's event ring.
    let control = graph.node_mut(counter).unwrap().control_mut();
    assert!(control.send_midi(0, MidiEvent::note_on(0, 1, 64, 90)));
    run_cycle(&graph, &mut io);
    assert_eq!(seen.load(Ordering::Relaxed), 3);
}

// ============================================================================
// Deferred work
// ============================================================================

/// Asks its worker to sum a byte slice and keeps the answers.
struct Summing {
    answers: Arc<Mutex<Vec<u32>>>,
    asked: bool,
}

struct SumWorker;

impl Worker for SumWorker {
    fn process_request(
        &mut self,
        request: &[u8],
        responder: &mut Responder<'_>,
    ) -> Result<(), WorkError> {
        if request.is_empty() {
            return Err(WorkError::Malformed("empty request".into()));
        }
        let sum: u32 = request.iter().map(|&b| u32::from(b)).sum();
        responder.respond(&sum.to_le_bytes());
        Ok(())
    }
}

impl Processor for Summing {
    fn num_ports(&self) -> u32 {
        0
    }
    fn port_type(&self, _index: u32) -> PortType {
        PortType::Unknown
    }
    fn is_port_input(&self, _index: u32) -> bool {
        false
    }
    fn run(&mut self, _ports: &mut PortBuffers, context: &mut RunContext<'_>) {
        if !self.asked {
            self.asked = context.schedule_work(&[1, 2, 3, 4]);
        }
    }
    fn take_worker(&mut self) -> Option<Box<dyn Worker>> {
        Some(Box::new(SumWorker))
    }
    fn work_response(&mut self, data: &[u8]) {
        if let Ok(bytes) = <[u8; 4]>::try_from(data) {
            self.answers.lock().push(u32::from_le_bytes(bytes));
        }
    }
}

#[test]
fn test_deferred_work_through_graph() {
    let (mut graph, _registry) = setup();
    let answers = Arc::new(Mutex::new(Vec::new()));
    let node = graph
        .add_instance(
            PluginDescription::new("Summing", "Test", "summing", 0, 0),
            Instance {
                processor: Box::new(Summing {
                    answers: Arc::clone(&answers),
                    asked: false,
                }),
                kind: NodeKind::Plugin,
            },
        )
        .unwrap();
    assert_eq!(graph.work_thread().worker_count(), 1);
    graph.compile().unwrap();

    let mut io = TestIo::new(0.0);
    let deadline = Instant::now() + Duration::from_secs(5);
    while answers.lock().is_empty() && Instant::now() < deadline {
        run_cycle(&graph, &mut io);
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(*answers.lock(), vec![10]);

    graph.remove_node(node).unwrap();
    assert_eq!(graph.work_thread().worker_count(), 0);
}
