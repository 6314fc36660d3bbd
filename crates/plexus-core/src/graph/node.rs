//! Graph vertices.
//!
//! A [`Node`] owns the UI half of its plugin ([`ModuleControl`]) and shares
//! the realtime half ([`PluginModule`]) with every compiled graph that
//! schedules it. The audio thread only ever `try_lock`s the module.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::module::{ModuleControl, PluginModule};
use crate::plugin::{PluginDescription, PluginError};
use crate::port::PortDescription;

/// Stable identifier of a node in an [`EngineGraph`](super::EngineGraph).
///
/// Ids are never reused by `add_node`; documents may restore explicit ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Returns a sentinel value used for uninitialized node references.
    #[inline]
    pub fn sentinel() -> Self {
        Self(u32::MAX)
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// The role of a node in the processing graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Receives device audio on its output ports.
    AudioInput,
    /// Sends its input ports to the device.
    AudioOutput,
    /// Receives device and UI MIDI on its output port.
    MidiInput,
    /// Any other plugin.
    Plugin,
}

/// Editor placement, persisted with the graph document.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeProperties {
    /// Canvas x.
    pub x: f64,
    /// Canvas y.
    pub y: f64,
    /// Last editor window x.
    pub ui_last_x: i32,
    /// Last editor window y.
    pub ui_last_y: i32,
}

/// A vertex of the engine graph.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) description: PluginDescription,
    pub(crate) ports: Vec<PortDescription>,
    pub(crate) module: Arc<Mutex<PluginModule>>,
    pub(crate) control: ModuleControl,
    /// Nodes with an arc into this one.
    pub(crate) sources: BTreeSet<NodeId>,
    /// Nodes this one has an arc into.
    pub(crate) dependants: BTreeSet<NodeId>,
    pub(crate) properties: NodeProperties,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        kind: NodeKind,
        description: PluginDescription,
        module: PluginModule,
        control: ModuleControl,
    ) -> Self {
        Self {
            id,
            kind,
            description,
            ports: module.ports().to_vec(),
            module: Arc::new(Mutex::new(module)),
            control,
            sources: BTreeSet::new(),
            dependants: BTreeSet::new(),
            properties: NodeProperties::default(),
        }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Graph role.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Description the plugin was loaded from.
    pub fn description(&self) -> &PluginDescription {
        &self.description
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.description.name
    }

    /// Port layout.
    pub fn ports(&self) -> &[PortDescription] {
        &self.ports
    }

    /// Number of ports.
    pub fn num_ports(&self) -> u32 {
        self.ports.len() as u32
    }

    /// Port `index`, if it exists.
    pub fn port(&self, index: u32) -> Option<&PortDescription> {
        self.ports.get(index as usize)
    }

    /// Index of the port with the given symbol.
    pub fn port_index(&self, symbol: &str) -> Option<u32> {
        self.ports
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.index)
    }

    /// Upstream nodes.
    pub fn sources(&self) -> &BTreeSet<NodeId> {
        &self.sources
    }

    /// Downstream nodes.
    pub fn dependants(&self) -> &BTreeSet<NodeId> {
        &self.dependants
    }

    /// Editor placement.
    pub fn properties(&self) -> &NodeProperties {
        &self.properties
    }

    /// Mutable editor placement.
    pub fn properties_mut(&mut self) -> &mut NodeProperties {
        &mut self.properties
    }

    /// UI-side control of the plugin.
    pub fn control(&self) -> &ModuleControl {
        &self.control
    }

    /// Mutable UI-side control of the plugin.
    pub fn control_mut(&mut self) -> &mut ModuleControl {
        &mut self.control
    }

    /// Realtime half of the plugin. Lock only off the audio thread.
    pub fn module(&self) -> &Arc<Mutex<PluginModule>> {
        &self.module
    }

    /// Saves the plugin state.
    pub fn save_state(&self) -> Vec<u8> {
        self.module.lock().save_state()
    }

    /// Restores plugin state and refreshes the UI-side value cache.
    pub fn restore_state(&mut self, data: &[u8]) -> Result<(), PluginError> {
        let mut module = self.module.lock();
        module.restore_state(data)?;
        self.control.sync_values(module.control_values());
        Ok(())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.description.name)
            .field("sources", &self.sources)
            .field("dependants", &self.dependants)
            .finish_non_exhaustive()
    }
}
