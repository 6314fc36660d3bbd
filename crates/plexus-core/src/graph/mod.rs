//! DAG-based plugin graph.
//!
//! The UI thread edits an [`EngineGraph`]: nodes hosting plugins, and
//! [`PortArc`](crate::PortArc)s between their ports. [`EngineGraph::compile`]
//! orders the nodes so every node runs after its sources and publishes the
//! result as an immutable [`CompiledGraph`]. The audio thread reads it through
//! a [`CompiledGraphReader`] without locking.
//!
//! ```rust,ignore
//! use plexus_core::graph::EngineGraph;
//! use plexus_core::{ModuleConfig, PluginRegistry, INTERNAL_FORMAT, AUDIO_INPUT_ID, AUDIO_OUTPUT_ID};
//!
//! let registry = PluginRegistry::with_internal(2, 2);
//! let mut graph = EngineGraph::new(ModuleConfig::default(), 8192)?;
//! let input = graph.add_node(&registry, &registry.find(INTERNAL_FORMAT, AUDIO_INPUT_ID).unwrap())?;
//! let output = graph.add_node(&registry, &registry.find(INTERNAL_FORMAT, AUDIO_OUTPUT_ID).unwrap())?;
//! graph.connect(input, 0, output, 0)?;
//! graph.compile()?;
//!
//! // Audio thread
//! let reader = graph.reader();
//! if let Some(compiled) = reader.load().as_ref() {
//!     compiled.process(&context, &mut device_io);
//! }
//! ```

mod compiled;
mod engine_graph;
mod error;
mod node;

pub use compiled::{
    BlockInput, CompiledBlock, CompiledGraph, CompiledGraphReader, GraphIo, Route,
};
pub use engine_graph::{DEFAULT_WORK_BUFFER_SIZE, EngineGraph, MAX_NODE_ID_GAP};
pub use error::GraphError;
pub use node::{Node, NodeId, NodeKind, NodeProperties};
