//! Settings and saved graphs for the Plexus host.
//!
//! - **Engine settings**: [`EngineConfig`], read from TOML, with sizes for the
//!   work thread, per-plugin rings and the device
//! - **Graph documents**: [`GraphDocument`] saves an [`EngineGraph`] as XML
//!   (nodes, placement, plugin state, arcs) and restores it through a
//!   [`PluginRegistry`]
//! - **Paths**: per-platform config and graph directories
//!
//! # Example
//!
//! ```rust,no_run
//! use plexus_config::{EngineConfig, load_graph, paths};
//! use plexus_core::{EngineGraph, PluginRegistry};
//!
//! let config = EngineConfig::load_or_default(paths::default_config_path())?;
//! let registry = PluginRegistry::with_internal(2, config.device.channels.into());
//! let mut graph = EngineGraph::new(config.module_config(), config.work_buffer_size)?;
//! let report = load_graph("live.xml", &mut graph, &registry)?;
//! println!("{} nodes", report.nodes_restored);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`EngineGraph`]: plexus_core::EngineGraph
//! [`PluginRegistry`]: plexus_core::PluginRegistry

mod document;
mod engine;
mod error;

/// Platform-specific paths for settings and graphs.
pub mod paths;

pub use document::{GraphDocument, LoadReport, NodeRecord, ROOT_TAG, load_graph, save_graph};
pub use engine::{DeviceConfig, EngineConfig};
pub use error::ConfigError;
pub use paths::{
    default_config_path, ensure_user_config_dir, ensure_user_graphs_dir, find_graph,
    list_graphs_in, user_config_dir, user_graphs_dir,
};
