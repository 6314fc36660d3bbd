//! The mutable node/arc model and its compiler.
//!
//! [`EngineGraph`] lives on the UI thread. Edits never touch the audio thread
//! directly: [`compile()`](EngineGraph::compile) builds a fresh
//! [`CompiledGraph`] and publishes it with one atomic swap. Superseded graphs
//! are parked in a retired list and released here, on the compiling thread,
//! once the audio thread no longer holds them.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::compiled::{BlockInput, CompiledBlock, CompiledGraph, CompiledGraphReader, Route};
use super::error::GraphError;
use super::node::{Node, NodeId, NodeKind, NodeProperties};
use crate::arc::{ArcTable, PortArc};
use crate::module::{ModuleConfig, PluginModule};
use crate::plugin::{Instance, PluginDescription, PluginRegistry};
use crate::port::PortType;
use crate::work::WorkThread;

/// Request ring size of the graph's work thread when none is given.
pub const DEFAULT_WORK_BUFFER_SIZE: usize = 8192;

/// How far past the current arena an explicit node id may land. The arena
/// and every compile-time table are sized by the largest id.
pub const MAX_NODE_ID_GAP: usize = 1024;

static NO_SOURCES: BTreeSet<NodeId> = BTreeSet::new();

/// Owns the live nodes and arcs of one graph.
pub struct EngineGraph {
    /// Arena indexed by `NodeId`. Dropped before the work thread.
    nodes: Vec<Option<Node>>,
    node_count: usize,
    /// Sorted by the `PortArc` ordering, no duplicates.
    arcs: Vec<PortArc>,
    config: ModuleConfig,
    published: Arc<ArcSwapOption<CompiledGraph>>,
    retired: Vec<Arc<CompiledGraph>>,
    work_thread: WorkThread,
}

impl EngineGraph {
    /// Creates an empty graph with its own deferred-work thread.
    pub fn new(config: ModuleConfig, work_buffer_size: usize) -> Result<Self, GraphError> {
        let work_thread = WorkThread::new("plexus-work", work_buffer_size)?;
        Ok(Self {
            nodes: Vec::new(),
            node_count: 0,
            arcs: Vec::new(),
            config,
            published: Arc::new(ArcSwapOption::empty()),
            retired: Vec::new(),
            work_thread,
        })
    }

    /// Module sizing used for new nodes.
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// The graph's deferred-work thread.
    pub fn work_thread(&self) -> &WorkThread {
        &self.work_thread
    }

    // --- Nodes ---

    /// Instantiates a plugin through `registry` and adds it under a fresh id.
    pub fn add_node(
        &mut self,
        registry: &PluginRegistry,
        description: &PluginDescription,
    ) -> Result<NodeId, GraphError> {
        let instance =
            registry.instantiate(description, self.config.sample_rate, self.config.block_size)?;
        self.add_instance(description.clone(), instance)
    }

    /// Instantiates a plugin and adds it under an explicit id, as when
    /// restoring a document.
    pub fn add_node_with_id(
        &mut self,
        id: u32,
        registry: &PluginRegistry,
        description: &PluginDescription,
    ) -> Result<NodeId, GraphError> {
        let id = self.claim_id(id)?;
        let instance =
            registry.instantiate(description, self.config.sample_rate, self.config.block_size)?;
        self.insert(id, description.clone(), instance)
    }

    /// Adds an already created plugin under a fresh id.
    pub fn add_instance(
        &mut self,
        description: PluginDescription,
        instance: Instance,
    ) -> Result<NodeId, GraphError> {
        let id = NodeId(self.nodes.len() as u32);
        self.insert(id, description, instance)
    }

    fn claim_id(&self, id: u32) -> Result<NodeId, GraphError> {
        let id = NodeId(id);
        if id == NodeId::sentinel() || self.node(id).is_some() {
            return Err(GraphError::DuplicateNodeId(id.index()));
        }
        if id.slot() > self.nodes.len() + MAX_NODE_ID_GAP {
            return Err(GraphError::NodeIdOutOfRange(id.index()));
        }
        Ok(id)
    }

    fn insert(
        &mut self,
        id: NodeId,
        description: PluginDescription,
        instance: Instance,
    ) -> Result<NodeId, GraphError> {
        let (mut module, control) =
            PluginModule::instantiate(instance.processor, &self.config, Some(&self.work_thread))?;
        module.activate();

        if self.nodes.len() <= id.slot() {
            self.nodes.resize_with(id.slot() + 1, || None);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_add_node: {id} '{}' ({:?}, {} ports)",
            description.name,
            instance.kind,
            module.num_ports()
        );
        self.nodes[id.slot()] = Some(Node::new(id, instance.kind, description, module, control));
        self.node_count += 1;
        Ok(id)
    }

    /// Removes a node and every arc touching it. The plugin is deactivated
    /// and its worker released.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        if self.node(id).is_none() {
            return Err(GraphError::NodeNotFound(id.index()));
        }
        self.disconnect_node(id, true, true);
        if let Some(node) = self.nodes[id.slot()].take() {
            node.module.lock().cleanup();
        }
        self.node_count -= 1;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove_node: {id}");
        Ok(())
    }

    /// Removes every node and arc.
    pub fn clear(&mut self) {
        for node in self.nodes.drain(..).flatten() {
            node.module.lock().cleanup();
        }
        self.arcs.clear();
        self.node_count = 0;
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    /// Mutable node by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.slot()).and_then(Option::as_mut)
    }

    /// Node by raw id.
    pub fn node_by_id(&self, id: u32) -> Option<&Node> {
        self.node(NodeId(id))
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// First node of the given kind.
    pub fn find_node(&self, kind: NodeKind) -> Option<NodeId> {
        self.nodes().find(|n| n.kind == kind).map(|n| n.id)
    }

    /// Moves a node on the editor canvas.
    pub fn set_node_position(&mut self, id: NodeId, x: f64, y: f64) -> Result<(), GraphError> {
        let node = self
            .node_mut(id)
            .ok_or(GraphError::NodeNotFound(id.index()))?;
        node.properties.x = x;
        node.properties.y = y;
        Ok(())
    }

    /// Replaces a node's editor properties.
    pub fn set_node_properties(
        &mut self,
        id: NodeId,
        properties: NodeProperties,
    ) -> Result<(), GraphError> {
        let node = self
            .node_mut(id)
            .ok_or(GraphError::NodeNotFound(id.index()))?;
        node.properties = properties;
        Ok(())
    }

    // --- Arcs ---

    /// Arcs in sorted order.
    pub fn arcs(&self) -> &[PortArc] {
        &self.arcs
    }

    /// Reachability index over the current arcs.
    pub fn arc_table(&self) -> ArcTable {
        ArcTable::new(&self.arcs)
    }

    /// Type and direction checks for one arc. Cycles are left to `compile`.
    fn check_arc(&self, arc: &PortArc) -> Result<(PortType, PortType), GraphError> {
        let source = self
            .node_by_id(arc.source_node)
            .ok_or(GraphError::NodeNotFound(arc.source_node))?;
        let dest = self
            .node_by_id(arc.dest_node)
            .ok_or(GraphError::NodeNotFound(arc.dest_node))?;
        let out = source.port(arc.source_port).ok_or(GraphError::PortOutOfRange {
            node: arc.source_node,
            port: arc.source_port,
        })?;
        let inp = dest.port(arc.dest_port).ok_or(GraphError::PortOutOfRange {
            node: arc.dest_node,
            port: arc.dest_port,
        })?;
        if out.input || !inp.input {
            return Err(GraphError::InvalidDirection(*arc));
        }
        if !PortType::can_connect(out.port_type, inp.port_type) {
            return Err(GraphError::IncompatiblePorts {
                from: out.port_type,
                to: inp.port_type,
            });
        }
        Ok((out.port_type, inp.port_type))
    }

    /// Connects an output port to an input port.
    ///
    /// Only existence, direction, type legality and duplicates are checked;
    /// an arc that closes a cycle is accepted and makes `compile` fail. Use
    /// [`can_connect`](Self::can_connect) to refuse such arcs up front.
    pub fn add_arc(&mut self, arc: PortArc) -> Result<(), GraphError> {
        self.check_arc(&arc)?;
        let at = match self.arcs.binary_search(&arc) {
            Ok(_) => return Err(GraphError::DuplicateArc(arc)),
            Err(at) => at,
        };
        self.arcs.insert(at, arc);
        self.link(NodeId(arc.source_node), NodeId(arc.dest_node));
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {arc}");
        Ok(())
    }

    /// Shorthand for [`add_arc`](Self::add_arc) with node ids.
    pub fn connect(
        &mut self,
        source: NodeId,
        source_port: u32,
        dest: NodeId,
        dest_port: u32,
    ) -> Result<(), GraphError> {
        self.add_arc(PortArc::new(source.0, source_port, dest.0, dest_port))
    }

    /// Removes one arc.
    pub fn remove_arc(&mut self, arc: &PortArc) -> Result<(), GraphError> {
        let at = self
            .arcs
            .binary_search(arc)
            .map_err(|_| GraphError::ArcNotFound(*arc))?;
        self.arcs.remove(at);
        self.relink(NodeId(arc.source_node), NodeId(arc.dest_node));
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_disconnect: {arc}");
        Ok(())
    }

    /// Removes a node's incoming and/or outgoing arcs. Returns how many went.
    pub fn disconnect_node(&mut self, id: NodeId, inputs: bool, outputs: bool) -> usize {
        let before = self.arcs.len();
        let mut touched = BTreeSet::new();
        self.arcs.retain(|arc| {
            let drop = (inputs && arc.dest_node == id.0) || (outputs && arc.source_node == id.0);
            if drop {
                touched.insert((NodeId(arc.source_node), NodeId(arc.dest_node)));
            }
            !drop
        });
        for (source, dest) in touched {
            self.relink(source, dest);
        }
        before - self.arcs.len()
    }

    /// Whether `arc` could be added without error and without closing a cycle.
    pub fn can_connect(&self, arc: &PortArc) -> bool {
        arc.source_node != arc.dest_node
            && self.check_arc(arc).is_ok()
            && self.arcs.binary_search(arc).is_err()
            && !self.arc_table().is_an_input_to(arc.dest_node, arc.source_node)
    }

    /// Drops arcs that are dangling or no longer type-legal, e.g. after a
    /// document restore or a plugin changing its ports. Returns how many went.
    pub fn remove_illegal_arcs(&mut self) -> usize {
        let illegal: Vec<PortArc> = self
            .arcs
            .iter()
            .filter(|arc| self.check_arc(arc).is_err())
            .copied()
            .collect();
        for arc in &illegal {
            #[cfg(feature = "tracing")]
            tracing::warn!("graph_remove_illegal_arc: {arc}");
            // Present by construction.
            let _ = self.remove_arc(arc);
        }
        illegal.len()
    }

    fn link(&mut self, source: NodeId, dest: NodeId) {
        if let Some(node) = self.node_mut(source) {
            node.dependants.insert(dest);
        }
        if let Some(node) = self.node_mut(dest) {
            node.sources.insert(source);
        }
    }

    /// Recomputes the node-level link after an arc between the pair went.
    fn relink(&mut self, source: NodeId, dest: NodeId) {
        let still_linked = self
            .arcs
            .iter()
            .any(|a| a.source_node == source.0 && a.dest_node == dest.0);
        if still_linked {
            return;
        }
        if let Some(node) = self.node_mut(source) {
            node.dependants.remove(&dest);
        }
        if let Some(node) = self.node_mut(dest) {
            node.sources.remove(&source);
        }
    }

    // --- Compilation ---

    fn sources_of(&self, id: NodeId) -> &BTreeSet<NodeId> {
        self.node(id).map_or(&NO_SOURCES, |n| &n.sources)
    }

    /// Depth-first postorder from every sink, then from anything unvisited.
    fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.node_count);
        let sinks = self.nodes().filter(|n| n.dependants.is_empty()).map(|n| n.id);
        let everything = self.nodes().map(|n| n.id);

        for root in sinks.chain(everything) {
            if marks[root.slot()] != Mark::Unvisited {
                continue;
            }
            marks[root.slot()] = Mark::OnStack;
            let mut stack = vec![(root, self.sources_of(root).iter())];
            while let Some((id, sources)) = stack.last_mut() {
                let id = *id;
                let next = sources.next().copied();
                match next {
                    Some(source) => match marks.get(source.slot()).copied() {
                        Some(Mark::Unvisited) => {
                            marks[source.slot()] = Mark::OnStack;
                            stack.push((source, self.sources_of(source).iter()));
                        }
                        Some(Mark::OnStack) => return Err(GraphError::CycleDetected),
                        Some(Mark::Done) | None => {}
                    },
                    None => {
                        marks[id.slot()] = Mark::Done;
                        order.push(id);
                        stack.pop();
                    }
                }
            }
        }

        if order.len() != self.node_count {
            return Err(GraphError::CycleDetected);
        }
        Ok(order)
    }

    /// Builds a new execution plan and publishes it to the audio thread.
    ///
    /// On failure nothing is published and the previous plan stays active.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if the arcs contain a cycle.
    pub fn compile(&mut self) -> Result<Arc<CompiledGraph>, GraphError> {
        let order = match self.execution_order() {
            Ok(order) => order,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("graph_compile failed: {err}; keeping previous schedule");
                return Err(err);
            }
        };

        let mut position = vec![usize::MAX; self.nodes.len()];
        for (i, id) in order.iter().enumerate() {
            position[id.slot()] = i;
        }

        let mut blocks = Vec::with_capacity(order.len());
        for &id in &order {
            let Some(node) = self.node(id) else {
                continue;
            };
            let inputs = self
                .arcs
                .iter()
                .filter(|arc| arc.dest_node == id.0)
                .filter_map(|arc| {
                    let source = self.node_by_id(arc.source_node)?;
                    let from = source.port(arc.source_port)?.port_type;
                    let to = node.port(arc.dest_port)?.port_type;
                    Some(BlockInput {
                        source_block: position[arc.source_node as usize],
                        source_port: arc.source_port,
                        dest_port: arc.dest_port,
                        route: Route::between(from, to)?,
                    })
                })
                .collect();
            blocks.push(CompiledBlock {
                node: id,
                kind: node.kind,
                module: Arc::clone(&node.module),
                sources: node.sources.iter().copied().collect(),
                inputs,
            });
        }

        #[cfg(feature = "tracing")]
        {
            tracing::debug!("graph_compile: {} blocks, {} arcs", blocks.len(), self.arcs.len());
            for (i, block) in blocks.iter().enumerate() {
                tracing::debug!("  block[{i}]: {} ({:?})", block.node, block.kind);
            }
        }

        let compiled = Arc::new(CompiledGraph {
            blocks,
            block_size: self.config.block_size,
        });
        if let Some(previous) = self.published.swap(Some(Arc::clone(&compiled))) {
            self.retired.push(previous);
        }
        self.collect_garbage();
        Ok(compiled)
    }

    /// The published plan, if any.
    pub fn compiled(&self) -> Option<Arc<CompiledGraph>> {
        self.published.load_full()
    }

    /// A handle the audio thread reads the published plan through.
    pub fn reader(&self) -> CompiledGraphReader {
        CompiledGraphReader::new(Arc::clone(&self.published))
    }

    /// Frees retired plans no reader still holds. Returns how many were freed.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|graph| Arc::strong_count(graph) > 1);
        before - self.retired.len()
    }

    /// Plans waiting for the audio thread to let go.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    // --- Runtime ---

    /// Re-activates every plugin at a new sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.config.sample_rate = sample_rate;
        for node in self.nodes.iter().flatten() {
            node.module.lock().set_sample_rate(sample_rate);
        }
    }

    /// Drains every node's notification ring. Call from the UI timer.
    pub fn timer_callback(&mut self) -> usize {
        self.nodes
            .iter_mut()
            .flatten()
            .map(|node| node.control.timer_callback())
            .sum()
    }
}

impl std::fmt::Debug for EngineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineGraph")
            .field("nodes", &self.node_count)
            .field("arcs", &self.arcs.len())
            .field("retired", &self.retired.len())
            .finish_non_exhaustive()
    }
}
