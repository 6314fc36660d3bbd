//! Graph validation command.

use std::path::Path;

use clap::Args;

use super::common::{load_config, open_graph, resolve_graph};

#[derive(Args)]
pub struct CheckArgs {
    /// Graph document (path or saved graph name)
    #[arg(value_name = "GRAPH")]
    graph: String,

    /// Exit with an error if anything in the document was skipped
    #[arg(long)]
    strict: bool,
}

pub fn run(args: CheckArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let path = resolve_graph(&args.graph)?;
    let loaded = open_graph(&path, &config)?;
    let graph = &loaded.graph;

    println!("Graph: {}", path.display());
    println!(
        "  {} node(s), {} arc(s)\n",
        graph.node_count(),
        graph.arcs().len()
    );

    println!("Nodes:");
    for node in graph.nodes() {
        let desc = node.description();
        println!(
            "  {:>3}  {:<24} {}/{}  ({} ports)",
            node.id().index(),
            node.name(),
            desc.format,
            desc.identifier,
            node.num_ports()
        );
    }

    if !graph.arcs().is_empty() {
        println!("\nArcs:");
        for arc in graph.arcs() {
            println!("  {arc}");
        }
    }

    let compiled = graph
        .compiled()
        .ok_or_else(|| anyhow::anyhow!("graph did not compile"))?;
    let order: Vec<String> = compiled
        .order()
        .iter()
        .map(|id| id.index().to_string())
        .collect();
    println!("\nExecution order: {}", order.join(" -> "));

    if args.strict && !loaded.report.is_clean() {
        anyhow::bail!(
            "{} problem(s) while loading the graph",
            loaded.report.problems.len() + loaded.report.illegal_arcs_removed
        );
    }
    Ok(())
}
