//! Plexus Core - realtime plugin graph engine
//!
//! This crate hosts plugins inside a node graph and renders that graph from a
//! realtime audio callback, with zero allocation and no blocking on the audio
//! path.
//!
//! # Core Abstractions
//!
//! ## Ports and Arcs
//!
//! - [`PortType`] - Typed ports and the connection legality table
//! - [`ChannelConfig`] - "Channel N of type T" to port index, per direction
//! - [`PortArc`] - One output-to-input connection
//! - [`ArcTable`] - "Is A an input to B" reachability index
//!
//! ## Graph
//!
//! - [`EngineGraph`] - Mutable nodes and arcs, owned by the UI thread
//! - [`CompiledGraph`] - Immutable execution order read by the audio thread
//!
//! ## Plugins
//!
//! - [`Processor`] - The capability set every hosted plugin implements
//! - [`PluginModule`] / [`ModuleControl`] - Realtime and UI halves of a plugin
//! - [`PluginRegistry`] - Plugin formats, passed explicitly to the engine
//!
//! ## Cross-Thread Messaging
//!
//! - [`ring_buffer`] - Lock-free single-producer/single-consumer byte queue
//! - [`PortEvent`] - Header framing for values sent through a ring
//! - [`WorkThread`] - Background dispatcher for deferred plugin work
//! - [`midi_collector`] - MIDI from any thread into the next audio cycle
//!
//! # Threads
//!
//! - **Audio**: walks the published [`CompiledGraph`]. Only `try_lock`s.
//! - **Work**: runs [`Worker`] requests. May block.
//! - **UI**: edits the graph, compiles, polls notifications on a timer.
//!
//! # Logging
//!
//! Enable the `tracing` feature to log graph edits and compilation.

pub mod arc;
pub mod graph;
pub mod midi;
pub mod module;
pub mod plugin;
pub mod port;
pub mod port_event;
pub mod processor;
pub mod ring_buffer;
pub mod work;

pub use arc::{ArcTable, PortArc};
pub use graph::{
    CompiledGraph, CompiledGraphReader, EngineGraph, GraphError, GraphIo, Node, NodeId, NodeKind,
    NodeProperties,
};
pub use midi::{EventBuffer, MidiCollector, MidiEvent, MidiSender, midi_collector};
pub use module::{ModuleConfig, ModuleControl, PluginModule, PortListener, PortNotifyCallback};
pub use plugin::{
    AUDIO_INPUT_ID, AUDIO_OUTPUT_ID, GAIN_ID, INTERNAL_FORMAT, Instance, InternalFormat,
    MAX_CHANNELS, MIDI_INPUT_ID, PluginDescription, PluginError, PluginFormat, PluginRegistry,
};
pub use port::{
    ChannelConfig, ChannelMapping, INVALID_PORT, PortDescription, PortRange, PortType,
};
pub use port_event::{PROTOCOL_FLOAT, PROTOCOL_MIDI, PortEvent, PortEventTime};
pub use processor::{PortBuffer, PortBuffers, ProcessContext, Processor, RunContext};
pub use ring_buffer::{RingReader, RingWriter, ring_buffer};
pub use work::{Responder, WorkError, WorkThread, Worker, WorkerHandle};
