//! Engine settings command.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use plexus_config::{EngineConfig, paths};

use super::common::load_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective settings as TOML
    Show,

    /// Print where settings are read from
    Path,
}

pub fn run(args: ConfigArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let path = config.map_or_else(paths::default_config_path, PathBuf::from);

    match args.command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            EngineConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Show => {
            print!("{}", load_config(config)?.to_toml()?);
        }
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
