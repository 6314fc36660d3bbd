//! Plexus CLI - load, check, render and play plugin graphs.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plexus")]
#[command(author, version, about = "Plexus plugin graph host", long_about = None)]
struct Cli {
    /// Engine settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph, compile it and print the execution order
    Check(commands::check::CheckArgs),

    /// Render a graph offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Play a graph on an audio device until Ctrl+C
    Play(commands::play::PlayArgs),

    /// List audio devices
    Devices,

    /// Create or show engine settings
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Check(args) => commands::check::run(args, config),
        Commands::Render(args) => commands::render::run(args, config),
        Commands::Play(args) => commands::play::run(args, config),
        Commands::Devices => commands::devices::run(),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
