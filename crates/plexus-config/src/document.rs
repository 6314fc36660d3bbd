//! Graph documents: the XML form of an engine graph.
//!
//! ```xml
//! <graph>
//!   <node uid="0" x="40" y="120" uiLastX="0" uiLastY="0">
//!     <plugin name="Audio Input" format="Internal" identifier="audio.input"
//!             numInputs="0" numOutputs="2"/>
//!     <state>AAAAAA==</state>
//!   </node>
//!   <arc source-block="0" source-port="0" dest-block="1" dest-port="0"/>
//! </graph>
//! ```
//!
//! `uid` is the node id; arcs refer to nodes by it. `state` is the node's
//! saved state in base64.

use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use plexus_core::{EngineGraph, NodeProperties, PluginDescription, PluginRegistry, PortArc};

use crate::ConfigError;

/// Root element name.
pub const ROOT_TAG: &str = "graph";

/// One saved node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Node id.
    pub uid: u32,
    /// Editor placement.
    pub properties: NodeProperties,
    /// Plugin to instantiate.
    pub plugin: PluginDescription,
    /// Saved state blob.
    pub state: Vec<u8>,
}

/// Nodes and arcs of a graph, detached from any engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDocument {
    /// Nodes in document order.
    pub nodes: Vec<NodeRecord>,
    /// Arcs in document order.
    pub arcs: Vec<PortArc>,
}

/// What [`GraphDocument::restore`] managed to rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Nodes recreated.
    pub nodes_restored: usize,
    /// Arcs recreated.
    pub arcs_restored: usize,
    /// Arcs dropped after loading because they were dangling or type-illegal.
    pub illegal_arcs_removed: usize,
    /// One line per skipped node, skipped arc or rejected state.
    pub problems: Vec<String>,
}

impl LoadReport {
    /// Whether everything in the document was restored.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.illegal_arcs_removed == 0
    }
}

impl GraphDocument {
    /// Snapshots every node and arc of `graph`, including plugin state.
    pub fn capture(graph: &EngineGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| NodeRecord {
                uid: node.id().index(),
                properties: *node.properties(),
                plugin: node.description().clone(),
                state: node.save_state(),
            })
            .collect();
        Self {
            nodes,
            arcs: graph.arcs().to_vec(),
        }
    }

    /// Rebuilds `graph` from this document and compiles it.
    ///
    /// The graph is cleared first. Nodes whose plugin cannot be created,
    /// states that do not apply and arcs that cannot be made are logged,
    /// listed in the report and skipped. Arcs left dangling or illegal are
    /// then stripped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Graph`] if the restored arcs contain a cycle.
    /// The graph keeps its restored nodes and arcs; nothing is published.
    pub fn restore(
        &self,
        graph: &mut EngineGraph,
        registry: &PluginRegistry,
    ) -> Result<LoadReport, ConfigError> {
        graph.clear();
        let mut report = LoadReport::default();

        for record in &self.nodes {
            let id = match graph.add_node_with_id(record.uid, registry, &record.plugin) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(
                        uid = record.uid,
                        plugin = %record.plugin.name,
                        "skipping node: {err}"
                    );
                    report.problems.push(format!("node {}: {err}", record.uid));
                    continue;
                }
            };
            report.nodes_restored += 1;

            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            *node.properties_mut() = record.properties;
            if !record.state.is_empty()
                && let Err(err) = node.restore_state(&record.state)
            {
                tracing::warn!(uid = record.uid, "state not restored: {err}");
                report.problems.push(format!("node {} state: {err}", record.uid));
            }
        }

        for arc in &self.arcs {
            match graph.add_arc(*arc) {
                Ok(()) => report.arcs_restored += 1,
                Err(err) => {
                    tracing::warn!(%arc, "skipping arc: {err}");
                    report.problems.push(format!("arc {arc}: {err}"));
                }
            }
        }

        report.illegal_arcs_removed = graph.remove_illegal_arcs();
        graph.compile()?;

        tracing::info!(
            nodes = report.nodes_restored,
            arcs = report.arcs_restored,
            problems = report.problems.len(),
            "graph restored"
        );
        Ok(report)
    }

    /// Serializes to XML.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<graph>\n");
        for node in &self.nodes {
            let p = &node.properties;
            out.push_str(&format!(
                "  <node uid=\"{}\" x=\"{}\" y=\"{}\" uiLastX=\"{}\" uiLastY=\"{}\">\n",
                node.uid, p.x, p.y, p.ui_last_x, p.ui_last_y
            ));
            let d = &node.plugin;
            out.push_str(&format!(
                "    <plugin name=\"{}\" format=\"{}\" identifier=\"{}\" numInputs=\"{}\" numOutputs=\"{}\"/>\n",
                escape_xml(&d.name),
                escape_xml(&d.format),
                escape_xml(&d.identifier),
                d.num_inputs,
                d.num_outputs
            ));
            out.push_str(&format!("    <state>{}</state>\n", STANDARD.encode(&node.state)));
            out.push_str("  </node>\n");
        }
        for arc in &self.arcs {
            out.push_str(&format!(
                "  <arc source-block=\"{}\" source-port=\"{}\" dest-block=\"{}\" dest-port=\"{}\"/>\n",
                arc.source_node, arc.source_port, arc.dest_node, arc.dest_port
            ));
        }
        out.push_str("</graph>\n");
        out
    }

    /// Parses XML. Unknown elements are ignored.
    pub fn from_xml(text: &str) -> Result<Self, ConfigError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(ConfigError::InvalidDocument(format!(
                "root element is <{}>, expected <{ROOT_TAG}>",
                root.tag_name().name()
            )));
        }

        let mut document = Self::default();
        for child in root.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "node" => document.nodes.push(parse_node(child)?),
                "arc" => document.arcs.push(PortArc::new(
                    attr(child, "source-block")?,
                    attr(child, "source-port")?,
                    attr(child, "dest-block")?,
                    attr(child, "dest-port")?,
                )),
                other => tracing::debug!(element = other, "ignoring unknown element"),
            }
        }
        Ok(document)
    }

    /// Reads a document file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_xml(&text)
    }

    /// Writes a document file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_xml()).map_err(|e| ConfigError::write_file(path, e))
    }
}

/// Loads the document at `path` into `graph`. See [`GraphDocument::restore`].
pub fn load_graph(
    path: impl AsRef<Path>,
    graph: &mut EngineGraph,
    registry: &PluginRegistry,
) -> Result<LoadReport, ConfigError> {
    GraphDocument::load(path)?.restore(graph, registry)
}

/// Saves `graph` to `path`.
pub fn save_graph(path: impl AsRef<Path>, graph: &EngineGraph) -> Result<(), ConfigError> {
    GraphDocument::capture(graph).save(path)
}

fn parse_node(node: roxmltree::Node<'_, '_>) -> Result<NodeRecord, ConfigError> {
    let uid = attr(node, "uid")?;
    let properties = NodeProperties {
        x: attr_or(node, "x", 0.0)?,
        y: attr_or(node, "y", 0.0)?,
        ui_last_x: attr_or(node, "uiLastX", 0)?,
        ui_last_y: attr_or(node, "uiLastY", 0)?,
    };

    let plugin = node
        .children()
        .find(|c| c.has_tag_name("plugin"))
        .ok_or_else(|| ConfigError::InvalidDocument(format!("node {uid} has no <plugin>")))?;
    let plugin = PluginDescription::new(
        plugin.attribute("name").unwrap_or_default(),
        plugin.attribute("format").unwrap_or_default(),
        plugin.attribute("identifier").unwrap_or_default(),
        attr_or(plugin, "numInputs", 0)?,
        attr_or(plugin, "numOutputs", 0)?,
    );

    let state = match node.children().find(|c| c.has_tag_name("state")) {
        Some(state) => {
            let text: String = state
                .text()
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            STANDARD.decode(text)?
        }
        None => Vec::new(),
    };

    Ok(NodeRecord {
        uid,
        properties,
        plugin,
        state,
    })
}

fn attr<T: FromStr>(node: roxmltree::Node<'_, '_>, name: &str) -> Result<T, ConfigError> {
    let raw = node.attribute(name).ok_or_else(|| {
        ConfigError::InvalidDocument(format!("<{}> is missing '{name}'", node.tag_name().name()))
    })?;
    parse_attr(node, name, raw)
}

/// Like [`attr`], but a missing or empty attribute yields `default`.
fn attr_or<T: FromStr>(
    node: roxmltree::Node<'_, '_>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match node.attribute(name).map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => parse_attr(node, name, raw),
    }
}

fn parse_attr<T: FromStr>(
    node: roxmltree::Node<'_, '_>,
    name: &str,
    raw: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::InvalidDocument(format!(
            "<{}> has a bad '{name}': {raw:?}",
            node.tag_name().name()
        ))
    })
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
