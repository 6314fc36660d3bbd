//! The immutable execution plan walked by the audio thread.

use std::sync::Arc;

use arc_swap::{ArcSwapOption, Guard};
use parking_lot::Mutex;

use super::node::{NodeId, NodeKind};
use crate::midi::EventBuffer;
use crate::module::PluginModule;
use crate::port::PortType;
use crate::processor::ProcessContext;

/// How data moves along one arc.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Audio or CV samples, summed into the destination.
    Signal,
    /// A control value added to every sample of a CV input.
    ControlToCv,
    /// A control value written into the destination's control cache.
    Control,
    /// Event sequences appended to the destination.
    Events,
}

impl Route {
    /// Route for a legal connection between two port types.
    pub fn between(source: PortType, dest: PortType) -> Option<Self> {
        if !PortType::can_connect(source, dest) {
            return None;
        }
        Some(match (source, dest) {
            (PortType::Control, PortType::Cv) => Route::ControlToCv,
            (PortType::Control, _) => Route::Control,
            (s, _) if s.is_sequence() => Route::Events,
            _ => Route::Signal,
        })
    }
}

/// One arc into a block, resolved against block positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInput {
    /// Position of the source block. Always before the receiving block.
    pub source_block: usize,
    /// Output port on the source.
    pub source_port: u32,
    /// Input port on the receiver.
    pub dest_port: u32,
    /// Transfer rule.
    pub route: Route,
}

/// One node's place in the schedule and its dependencies at compile time.
pub struct CompiledBlock {
    pub(crate) node: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) module: Arc<Mutex<PluginModule>>,
    pub(crate) sources: Vec<NodeId>,
    pub(crate) inputs: Vec<BlockInput>,
}

impl CompiledBlock {
    /// Scheduled node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Graph role.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Upstream nodes when the graph was compiled.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Incoming arcs.
    pub fn inputs(&self) -> &[BlockInput] {
        &self.inputs
    }
}

impl std::fmt::Debug for CompiledBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledBlock")
            .field("node", &self.node)
            .field("kind", &self.kind)
            .field("sources", &self.sources)
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}

/// Device side of one render call.
pub trait GraphIo {
    /// Fills `dest` with device input channel `channel`.
    fn audio_input(&mut self, channel: usize, dest: &mut [f32]);
    /// Mixes `source` into device output channel `channel`.
    fn audio_output(&mut self, channel: usize, source: &[f32]);
    /// Appends this cycle's incoming MIDI to `dest`.
    fn midi_input(&mut self, dest: &mut EventBuffer);
}

/// Ordered sequence of blocks. Immutable once published.
#[derive(Debug)]
pub struct CompiledGraph {
    pub(crate) blocks: Vec<CompiledBlock>,
    pub(crate) block_size: usize,
}

impl CompiledGraph {
    /// Blocks in execution order.
    pub fn blocks(&self) -> &[CompiledBlock] {
        &self.blocks
    }

    /// Most frames one [`process`](Self::process) call renders. Longer
    /// contexts are truncated by each module.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the graph schedules nothing.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Node ids in execution order.
    pub fn order(&self) -> Vec<NodeId> {
        self.blocks.iter().map(|b| b.node).collect()
    }

    /// Position of `node` in the order.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.blocks.iter().position(|b| b.node == node)
    }

    /// Renders one sub-block. Realtime safe.
    ///
    /// Each block clears its inputs, gathers data along its arcs, then runs.
    /// Device audio and MIDI enter through input nodes; output nodes mix into
    /// `io`. A block whose module is locked elsewhere is skipped, as is an arc
    /// whose source is locked.
    pub fn process(&self, context: &ProcessContext, io: &mut dyn GraphIo) {
        let frames = context.frame_count;
        for block in &self.blocks {
            let Some(mut module) = block.module.try_lock() else {
                continue;
            };
            module.prepare_inputs(frames);

            for input in &block.inputs {
                let Some(source) = self.blocks[input.source_block].module.try_lock() else {
                    continue;
                };
                transfer(&source, &mut module, input, frames);
            }

            match block.kind {
                NodeKind::AudioInput => {
                    module.fill_audio_outputs(frames, |channel, buf| io.audio_input(channel, buf));
                }
                NodeKind::MidiInput => module.fill_midi_outputs(|events| io.midi_input(events)),
                NodeKind::AudioOutput | NodeKind::Plugin => {}
            }

            module.run(context);

            if block.kind == NodeKind::AudioOutput {
                module.read_audio_inputs(frames, |channel, buf| io.audio_output(channel, buf));
            }
        }
    }
}

fn transfer(source: &PluginModule, dest: &mut PluginModule, input: &BlockInput, frames: usize) {
    match input.route {
        Route::Signal => {
            let src = source.buffers().audio(input.source_port);
            let dst = dest.buffers_mut().audio_mut(input.dest_port);
            let n = frames.min(src.len()).min(dst.len());
            for (d, s) in dst[..n].iter_mut().zip(&src[..n]) {
                *d += s;
            }
        }
        Route::ControlToCv => {
            let value = source.buffers().control(input.source_port);
            let dst = dest.buffers_mut().audio_mut(input.dest_port);
            let n = frames.min(dst.len());
            for d in &mut dst[..n] {
                *d += value;
            }
        }
        Route::Control => {
            let value = source.buffers().control(input.source_port);
            dest.write_control(input.dest_port, value);
        }
        Route::Events => {
            if let (Some(src), Some(dst)) = (
                source.buffers().events(input.source_port),
                dest.buffers_mut().events_mut(input.dest_port),
            ) {
                dst.extend_from(src);
            }
        }
    }
}

/// Lock-free view of the currently published graph, for the audio thread.
#[derive(Clone, Debug)]
pub struct CompiledGraphReader {
    shared: Arc<ArcSwapOption<CompiledGraph>>,
}

impl CompiledGraphReader {
    pub(crate) fn new(shared: Arc<ArcSwapOption<CompiledGraph>>) -> Self {
        Self { shared }
    }

    /// The active graph. Never blocks or allocates.
    #[inline]
    pub fn load(&self) -> Guard<Option<Arc<CompiledGraph>>> {
        self.shared.load()
    }

    /// The active graph as an owned handle. Costs a reference-count increment.
    pub fn load_full(&self) -> Option<Arc<CompiledGraph>> {
        self.shared.load_full()
    }
}
