use crate::arc::PortArc;
use crate::plugin::PluginError;
use crate::port::PortType;

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No node with this id.
    #[error("node {0} not found")]
    NodeNotFound(u32),

    /// The node has fewer ports than the arc names.
    #[error("node {node} has no port {port}")]
    PortOutOfRange {
        /// Node id.
        node: u32,
        /// Port index.
        port: u32,
    },

    /// The arc does not run from an output port to an input port.
    #[error("arc {0} must run from an output to an input")]
    InvalidDirection(PortArc),

    /// The port types cannot be connected.
    #[error("cannot connect a {from} port to a {to} port")]
    IncompatiblePorts {
        /// Source port type.
        from: PortType,
        /// Destination port type.
        to: PortType,
    },

    /// The same 4-tuple is already connected.
    #[error("arc {0} already exists")]
    DuplicateArc(PortArc),

    /// No such arc.
    #[error("arc {0} not found")]
    ArcNotFound(PortArc),

    /// The arc set is not acyclic.
    #[error("graph contains a cycle")]
    CycleDetected,

    /// `add_node_with_id` was given an id that is taken.
    #[error("node id {0} is already in use")]
    DuplicateNodeId(u32),

    /// `add_node_with_id` was given an id too far past the arena's end.
    #[error("node id {0} is out of range")]
    NodeIdOutOfRange(u32),

    /// Loading the node's plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The deferred-work thread could not be started.
    #[error("failed to start work thread: {0}")]
    WorkThread(#[from] std::io::Error),
}
