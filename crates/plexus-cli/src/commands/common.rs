//! Shared CLI helpers used across multiple commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use plexus_config::{EngineConfig, LoadReport, find_graph, load_graph, paths};
use plexus_core::{EngineGraph, PluginRegistry};

/// Engine settings from `path`, or from the default location if it exists.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Ok(EngineConfig::load_or_default(paths::default_config_path())?),
    }
}

/// Resolves a graph argument: a file path, or a name in the user graphs
/// directory.
pub fn resolve_graph(name: &str) -> anyhow::Result<PathBuf> {
    find_graph(name).with_context(|| format!("graph '{name}' not found"))
}

/// A restored graph and what the restore skipped.
pub struct LoadedGraph {
    pub graph: EngineGraph,
    pub report: LoadReport,
}

/// Builds an engine from `config` and restores the graph at `path` into it.
pub fn open_graph(path: &Path, config: &EngineConfig) -> anyhow::Result<LoadedGraph> {
    let channels = u32::from(config.device.channels);
    let registry = PluginRegistry::with_internal(channels, channels);
    let mut graph = EngineGraph::new(config.module_config(), config.work_buffer_size)?;
    let report = load_graph(path, &mut graph, &registry)
        .with_context(|| format!("loading graph {}", path.display()))?;
    for problem in &report.problems {
        eprintln!("warning: {problem}");
    }
    if report.illegal_arcs_removed > 0 {
        eprintln!(
            "warning: removed {} illegal arc(s)",
            report.illegal_arcs_removed
        );
    }
    Ok(LoadedGraph { graph, report })
}
